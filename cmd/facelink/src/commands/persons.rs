//! Persons commands.

use clap::{Args, Subcommand};
use facelink_faceid::PersonId;

use super::{open_engine, output_result, user};
use crate::Cli;

#[derive(Args)]
pub struct PersonsCommand {
    #[command(subcommand)]
    command: PersonsSubcommand,
}

#[derive(Subcommand)]
enum PersonsSubcommand {
    /// List persons, newest first
    List,
    /// Set the display name of a person
    Rename {
        /// Person ID
        person_id: String,
        /// New name
        name: String,
    },
    /// Delete a person and all of its embeddings
    Delete {
        /// Person ID
        person_id: String,
    },
}

impl PersonsCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let user = user(cli);

        match &self.command {
            PersonsSubcommand::List => {
                let persons = engine.list_persons(&user).await?;
                output_result(&persons, cli.output.as_deref(), cli.json)
            }
            PersonsSubcommand::Rename { person_id, name } => {
                let id = PersonId::new(person_id.as_str());
                match engine.rename_person(&user, &id, name).await? {
                    Some(person) => output_result(&person, cli.output.as_deref(), cli.json),
                    None => anyhow::bail!("person '{}' not found", person_id),
                }
            }
            PersonsSubcommand::Delete { person_id } => {
                engine
                    .delete_person(&user, &PersonId::new(person_id.as_str()))
                    .await?;
                eprintln!("Deleted person {}", person_id);
                Ok(())
            }
        }
    }
}

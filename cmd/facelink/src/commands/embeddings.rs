//! Embeddings commands.

use clap::{Args, Subcommand};
use facelink_faceid::EmbeddingId;

use super::{open_engine, output_result, user};
use crate::Cli;

#[derive(Args)]
pub struct EmbeddingsCommand {
    #[command(subcommand)]
    command: EmbeddingsSubcommand,
}

#[derive(Subcommand)]
enum EmbeddingsSubcommand {
    /// List stored embeddings, oldest first
    List {
        /// Only embeddings of this person
        #[arg(long)]
        person: Option<String>,
    },
    /// Delete one embedding and refresh its person's centroid
    Delete {
        /// Embedding ID
        embedding_id: String,
    },
}

impl EmbeddingsCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let engine = open_engine(cli)?;
        let user = user(cli);

        match &self.command {
            EmbeddingsSubcommand::List { person } => {
                let mut embs = engine.list_embeddings(&user).await?;
                if let Some(person) = person {
                    embs.retain(|e| e.person_id.as_str() == person);
                }
                output_result(&embs, cli.output.as_deref(), cli.json)
            }
            EmbeddingsSubcommand::Delete { embedding_id } => {
                let id = EmbeddingId::new(embedding_id.as_str());
                if !engine.delete_embedding(&user, &id).await? {
                    anyhow::bail!("embedding '{}' not found", embedding_id);
                }
                eprintln!("Deleted embedding {}", embedding_id);
                Ok(())
            }
        }
    }
}

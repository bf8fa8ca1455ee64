//! Reset command.

use clap::Args;

use super::{open_engine, user};
use crate::Cli;

/// Delete every person and embedding of the user.
#[derive(Args)]
pub struct ResetCommand {
    /// Confirm the deletion
    #[arg(long)]
    yes: bool,
}

impl ResetCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        if !self.yes {
            anyhow::bail!("refusing to delete all data of '{}' without --yes", cli.user);
        }
        let engine = open_engine(cli)?;
        let removed = engine.reset_user(&user(cli)).await?;
        eprintln!("Removed {} persons of {}", removed, cli.user);
        Ok(())
    }
}

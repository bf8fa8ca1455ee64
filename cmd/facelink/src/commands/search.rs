//! Search command.

use clap::Args;

use super::{load_request, open_engine, output_result, require_input_file, user};
use crate::Cli;

/// Find persons matching the query vectors of the input file.
///
/// The file holds a list of vectors; the best match per person across all
/// of them is reported, highest score first.
#[derive(Args)]
pub struct SearchCommand {
    /// Report at most this many persons
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

impl SearchCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let queries: Vec<Vec<f32>> = load_request(require_input_file(cli)?)?;
        let engine = open_engine(cli)?;

        let mut hits = engine.search(&user(cli), &queries).await?;
        if let Some(n) = self.limit {
            hits.truncate(n);
        }
        output_result(&hits, cli.output.as_deref(), cli.json)
    }
}

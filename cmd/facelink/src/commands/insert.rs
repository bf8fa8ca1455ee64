//! Insert command.

use clap::Args;
use facelink_faceid::{Assignment, FaceInput};
use tracing::info;

use super::{load_request, open_engine, output_result, require_input_file, user};
use crate::Cli;

/// Cluster the faces of the input file.
///
/// The file holds a list of faces:
///
///   - vector: [0.01, -0.2, ...]
///     image_ref: photos/a.jpg
///     source: local        # or gdrive
///     thumbnail: crops/a.jpg
#[derive(Args)]
pub struct InsertCommand {
    /// Treat all faces as one batch, grouping them with each other too
    #[arg(long)]
    batch: bool,
}

impl InsertCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let faces: Vec<FaceInput> = load_request(require_input_file(cli)?)?;
        let engine = open_engine(cli)?;
        let user = user(cli);

        let assignments: Vec<Assignment> = if self.batch {
            engine.insert_batch(&user, faces).await?
        } else {
            let mut out = Vec::with_capacity(faces.len());
            for face in faces {
                out.push(engine.insert_face(&user, face).await?);
            }
            out
        };

        info!(
            faces = assignments.len(),
            created = assignments.iter().filter(|a| a.created).count(),
            "insert done"
        );
        output_result(&assignments, cli.output.as_deref(), cli.json)
    }
}

//! facelink CLI - cluster face embeddings into persons and search them.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{EmbeddingsCommand, InsertCommand, PersonsCommand, ResetCommand, SearchCommand};

/// facelink - face identity resolution over a local database.
///
/// Faces are given as embedding vectors in YAML or JSON files. Data lives in
/// a redb file (default ./facelink.redb) and is partitioned by user.
#[derive(Parser)]
#[command(name = "facelink")]
#[command(about = "Face identity clustering and search")]
#[command(version)]
pub struct Cli {
    /// Database file
    #[arg(long, global = true, default_value = "facelink.redb")]
    pub db: String,

    /// Engine config file (YAML or JSON); missing fields take defaults
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// User whose data is read or changed
    #[arg(short = 'u', long, global = true, default_value = "default")]
    pub user: String,

    /// Input file (YAML or JSON)
    #[arg(short = 'f', long = "file", global = true)]
    pub input: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cluster faces into persons
    Insert(InsertCommand),
    /// Find persons matching query faces
    Search(SearchCommand),
    /// List, rename or delete persons
    Persons(PersonsCommand),
    /// List or delete stored embeddings
    Embeddings(EmbeddingsCommand),
    /// Delete all data of the user
    Reset(ResetCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Insert(cmd) => cmd.run(&cli).await,
        Commands::Search(cmd) => cmd.run(&cli).await,
        Commands::Persons(cmd) => cmd.run(&cli).await,
        Commands::Embeddings(cmd) => cmd.run(&cli).await,
        Commands::Reset(cmd) => cmd.run(&cli).await,
    }
}

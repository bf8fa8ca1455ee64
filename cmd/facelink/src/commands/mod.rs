//! CLI commands module.

mod embeddings;
mod insert;
mod persons;
mod reset;
mod search;
mod util;

pub use embeddings::EmbeddingsCommand;
pub use insert::InsertCommand;
pub use persons::PersonsCommand;
pub use reset::ResetCommand;
pub use search::SearchCommand;

pub(crate) use util::*;

//! Persistent storage for facelink.
//!
//! [`RedbStore`] implements [`facelink_faceid::Persistence`] on top of an
//! embedded redb database, so an [`facelink_faceid::Engine`] keeps its
//! persons and embeddings across restarts.
//!
//! ```no_run
//! use std::sync::Arc;
//! use facelink_faceid::{Config, Engine};
//! use facelink_facestore::RedbStore;
//!
//! let store = RedbStore::open("faces.redb")?;
//! let engine = Engine::new(Config::default(), Arc::new(store))?;
//! # Ok::<(), facelink_faceid::FaceIdError>(())
//! ```

pub mod keys;
mod redb;

pub use self::redb::RedbStore;

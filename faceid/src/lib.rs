//! Face identity resolution over descriptor vectors.
//!
//! Decides, for every face vector extracted from a photograph, which
//! previously seen person it belongs to or whether it is a new person, and
//! answers similarity searches over the clustered faces. All state is
//! partitioned by user.
//!
//! # Usage
//!
//! ```no_run
//! use facelink_faceid::{Config, Engine, FaceInput, UserId};
//!
//! # async fn run() -> Result<(), facelink_faceid::FaceIdError> {
//! let engine = Engine::with_memory_store(Config::with_dim(128))?;
//! let user = UserId::new("u1");
//!
//! let a = engine.insert_face(&user, FaceInput::new(vec![0.1; 128], "img_1")).await?;
//! let hits = engine.search(&user, &[vec![0.1; 128]]).await?;
//! assert_eq!(hits[0].person_id, a.person_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//!
//! Lookups run in two stages. The coarse stage ([`filter`]) keeps the
//! persons whose centroid lies within `coarse_threshold` of the query; the
//! fine stage ([`matcher`]) compares against the individual embeddings of
//! those persons only. Centroids ([`centroid`]) are recomputed once per
//! committed operation.
//!
//! Batch imports ([`assign::BatchPlanner`]) also cluster faces of the
//! batch with each other by comparing against the first member of each
//! batch cluster, keeping the cost linear in the number of clusters.

pub mod assign;
pub mod centroid;
mod commit;
pub mod config;
pub mod detector;
pub mod distance;
mod engine;
pub mod error;
pub mod filter;
mod locks;
pub mod matcher;
pub mod search;
pub mod store;
pub mod types;

pub use config::{Config, DEFAULT_PERSON_NAME};
pub use detector::{DetectedFace, Detector};
pub use distance::{distance, distance_dim, MAX_DISTANCE};
pub use engine::Engine;
pub use error::{FaceIdError, FaceIdResult};
pub use locks::UserLocks;
pub use store::{MemoryStore, Persistence};
pub use types::{
    Assignment, ConfidenceTier, Embedding, EmbeddingId, FaceInput, NewEmbedding, NewPerson,
    Person, PersonId, PersonState, SearchHit, Source, UserId,
};

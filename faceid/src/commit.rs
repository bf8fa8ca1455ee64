//! Write journal for all-or-nothing operations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{FaceIdError, FaceIdResult};
use crate::store::Persistence;
use crate::types::{EmbeddingId, PersonId, UserId};

/// Runs a collaborator call under `timeout`.
pub(crate) async fn bounded<T, F>(op: &'static str, timeout: Duration, fut: F) -> FaceIdResult<T>
where
    F: Future<Output = FaceIdResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(r) => r,
        Err(_) => Err(FaceIdError::Timeout { op, timeout }),
    }
}

#[derive(Debug)]
enum Undo {
    Person(PersonId),
    Embedding(EmbeddingId),
    Centroid(PersonId, Option<Vec<f32>>),
}

/// Records the writes of one operation so they can be reverted.
///
/// Writes must be recorded right after they succeed. Rollback undoes them
/// in reverse order.
#[derive(Debug)]
pub(crate) struct Journal {
    user: UserId,
    undo: Vec<Undo>,
}

impl Journal {
    pub fn new(user: &UserId) -> Self {
        Self {
            user: user.clone(),
            undo: Vec::new(),
        }
    }

    pub fn person_created(&mut self, id: PersonId) {
        self.undo.push(Undo::Person(id));
    }

    pub fn embedding_created(&mut self, id: EmbeddingId) {
        self.undo.push(Undo::Embedding(id));
    }

    /// Records the centroid a person had before it was overwritten.
    pub fn centroid_replaced(&mut self, id: PersonId, previous: Option<Vec<f32>>) {
        self.undo.push(Undo::Centroid(id, previous));
    }

    pub fn len(&self) -> usize {
        self.undo.len()
    }

    /// Reverts every recorded write. Failures are logged and skipped so
    /// that as much as possible is undone.
    pub async fn rollback(self, store: &dyn Persistence, timeout: Duration) {
        let user = self.user;
        for undo in self.undo.into_iter().rev() {
            let res = match &undo {
                Undo::Centroid(id, previous) => {
                    bounded(
                        "update_person_centroid",
                        timeout,
                        store.update_person_centroid(&user, id, previous.clone()),
                    )
                    .await
                }
                Undo::Embedding(id) => {
                    bounded("delete_embedding", timeout, store.delete_embedding(&user, id))
                        .await
                        .map(|_| ())
                }
                Undo::Person(id) => {
                    match bounded(
                        "delete_embeddings_by_person",
                        timeout,
                        store.delete_embeddings_by_person(&user, id),
                    )
                    .await
                    {
                        Ok(()) => bounded("delete_person", timeout, store.delete_person(&user, id)).await,
                        Err(e) => Err(e),
                    }
                }
            };
            if let Err(e) = res {
                warn!(user = %user, ?undo, error = %e, "rollback step failed");
            }
        }
    }
}

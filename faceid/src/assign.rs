//! Cluster assignment: single faces and whole import batches.
//!
//! Both modes only decide. Writing the decisions, and undoing them on
//! failure, is left to the engine.

use std::collections::HashMap;

use tracing::debug;

use crate::config::Config;
use crate::distance::distance_dim;
use crate::matcher::{is_duplicate, Verdict};
use crate::types::{Assignment, Embedding, FaceInput, NewPerson, Person, PersonId};

/// What to do with a single incoming face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Already represented by this person; write nothing.
    Duplicate(PersonId),
    /// Attach to an existing person.
    Attach(PersonId),
    /// Create a person with this fresh id, then attach.
    Create(PersonId),
}

impl Decision {
    pub fn person_id(&self) -> &PersonId {
        match self {
            Decision::Duplicate(id) | Decision::Attach(id) | Decision::Create(id) => id,
        }
    }

    pub fn assignment(&self) -> Assignment {
        Assignment {
            person_id: self.person_id().clone(),
            created: matches!(self, Decision::Create(_)),
            duplicate: matches!(self, Decision::Duplicate(_)),
        }
    }
}

/// Turns the fine-stage verdict into a decision, allocating an id for a
/// new person when nothing matched.
pub fn decide(verdict: &Verdict<'_>) -> Decision {
    match verdict {
        Verdict::Duplicate { embedding, .. } => Decision::Duplicate(embedding.person_id.clone()),
        Verdict::Match { person_id, .. } => Decision::Attach(person_id.clone()),
        Verdict::NoMatch => Decision::Create(PersonId::generate()),
    }
}

/// A person formed inside one batch and not persisted yet.
#[derive(Debug, Clone)]
pub struct BatchCluster {
    pub person_id: PersonId,
    /// First member. Later faces are compared against it only.
    pub representative: Vec<f32>,
    /// Crop of the first member.
    pub thumbnail: String,
    members: Vec<Vec<f32>>,
}

impl BatchCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of planning a batch.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Clusters to materialize as persons, in formation order.
    pub clusters: Vec<BatchCluster>,
    /// One entry per input face, in input order.
    pub assignments: Vec<Assignment>,
}

impl BatchPlan {
    /// Person rows to create before any embedding is written.
    pub fn new_persons(&self, name: &str) -> Vec<NewPerson> {
        self.clusters
            .iter()
            .map(|c| NewPerson {
                person_id: c.person_id.clone(),
                name: name.to_string(),
                thumbnail: Some(c.thumbnail.clone()),
            })
            .collect()
    }
}

/// Assigns the faces of one batch in arrival order.
///
/// Each face is first compared with the persisted centroids at
/// `batch_persisted_threshold`; a persisted match wins. Otherwise it is
/// compared with the representative of every batch cluster formed so far
/// at `batch_local_threshold`, and failing that it starts a new cluster.
/// Cost is O(batch × (persons + clusters)).
pub struct BatchPlanner<'c> {
    cfg: &'c Config,
    persisted: Vec<(PersonId, Vec<f32>)>,
    /// Known vectors of persisted persons targeted by this batch, for
    /// duplicate detection.
    members: HashMap<PersonId, Vec<Vec<f32>>>,
    clusters: Vec<BatchCluster>,
    assignments: Vec<Assignment>,
}

impl<'c> BatchPlanner<'c> {
    pub fn new(cfg: &'c Config, persons: &[Person]) -> Self {
        let persisted = persons
            .iter()
            .filter_map(|p| p.centroid.as_ref().map(|c| (p.person_id.clone(), c.clone())))
            .collect();
        Self {
            cfg,
            persisted,
            members: HashMap::new(),
            clusters: Vec::new(),
            assignments: Vec::new(),
        }
    }

    /// Closest persisted person within `batch_persisted_threshold`.
    pub fn nearest_persisted(&self, vector: &[f32]) -> Option<&PersonId> {
        nearest(
            self.persisted.iter().map(|(id, c)| (id, c.as_slice())),
            vector,
            self.cfg.batch_persisted_threshold,
            self.cfg.dim,
        )
        .map(|(id, _)| id)
    }

    /// Whether the stored embeddings of `person_id` still have to be loaded.
    pub fn needs_members(&self, person_id: &PersonId) -> bool {
        !self.members.contains_key(person_id)
    }

    pub fn load_members(&mut self, person_id: &PersonId, embeddings: &[Embedding]) {
        self.members.insert(
            person_id.clone(),
            embeddings.iter().map(|e| e.vector.clone()).collect(),
        );
    }

    /// Assigns one face and returns its outcome.
    pub fn assign(&mut self, face: &FaceInput) -> Assignment {
        let vector = face.vector.as_slice();

        // Step 1: persisted identities take priority.
        if let Some(person_id) = self.nearest_persisted(vector).cloned() {
            let members = self.members.entry(person_id.clone()).or_default();
            let duplicate = is_duplicate(vector, members, self.cfg);
            if !duplicate {
                members.push(vector.to_vec());
            }
            debug!(person = %person_id, duplicate, "batch face matched persisted person");
            return self.record(person_id, false, duplicate);
        }

        // Step 2: batch-local clusters, compared by representative.
        let local = nearest(
            self.clusters
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.representative.as_slice())),
            vector,
            self.cfg.batch_local_threshold,
            self.cfg.dim,
        );
        if let Some((idx, _)) = local {
            let cluster = &mut self.clusters[idx];
            let duplicate = is_duplicate(vector, &cluster.members, self.cfg);
            if !duplicate {
                cluster.members.push(vector.to_vec());
            }
            let person_id = cluster.person_id.clone();
            debug!(person = %person_id, duplicate, "batch face joined batch cluster");
            return self.record(person_id, false, duplicate);
        }

        // Step 3: new cluster.
        let person_id = PersonId::generate();
        self.clusters.push(BatchCluster {
            person_id: person_id.clone(),
            representative: vector.to_vec(),
            thumbnail: face.thumbnail_or_image(),
            members: vec![vector.to_vec()],
        });
        debug!(person = %person_id, "batch face started new cluster");
        self.record(person_id, true, false)
    }

    pub fn finish(self) -> BatchPlan {
        BatchPlan {
            clusters: self.clusters,
            assignments: self.assignments,
        }
    }

    fn record(&mut self, person_id: PersonId, created: bool, duplicate: bool) -> Assignment {
        let a = Assignment {
            person_id,
            created,
            duplicate,
        };
        self.assignments.push(a.clone());
        a
    }
}

/// Lowest-distance entry strictly below `threshold`.
fn nearest<'v, K, I>(entries: I, vector: &[f32], threshold: f32, dim: usize) -> Option<(K, f32)>
where
    I: IntoIterator<Item = (K, &'v [f32])>,
{
    let mut best: Option<(K, f32)> = None;
    for (key, v) in entries {
        let d = distance_dim(vector, v, dim);
        if d >= threshold {
            continue;
        }
        if best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((key, d));
        }
    }
    best
}

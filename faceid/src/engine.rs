use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::assign::{decide, BatchPlanner, Decision};
use crate::centroid;
use crate::commit::{bounded, Journal};
use crate::config::Config;
use crate::detector::Detector;
use crate::error::{FaceIdError, FaceIdResult};
use crate::filter::candidates;
use crate::locks::UserLocks;
use crate::matcher::classify;
use crate::search;
use crate::store::{MemoryStore, Persistence};
use crate::types::{
    Assignment, Embedding, EmbeddingId, FaceInput, NewEmbedding, NewPerson, Person, PersonId,
    SearchHit, Source, UserId,
};

/// Resolves face identities for many users.
///
/// Every state-changing operation holds the user's write lock for its whole
/// duration and either commits all of its writes or none. Searches and
/// listings hold the read lock, so they see the last committed state.
/// Thread-safe.
pub struct Engine {
    cfg: Config,
    store: Arc<dyn Persistence>,
    detector: Option<Arc<dyn Detector>>,
    locks: UserLocks,
}

impl Engine {
    /// Creates an engine. Zero config fields take their defaults; the
    /// result must pass [`Config::validate`].
    pub fn new(cfg: Config, store: Arc<dyn Persistence>) -> FaceIdResult<Self> {
        let cfg = cfg.with_defaults();
        cfg.validate()?;
        Ok(Self {
            cfg,
            store,
            detector: None,
            locks: UserLocks::new(),
        })
    }

    /// Creates an engine with a default in-memory store.
    pub fn with_memory_store(cfg: Config) -> FaceIdResult<Self> {
        Self::new(cfg, Arc::new(MemoryStore::new()))
    }

    /// Enables [`Engine::ingest_image`] and [`Engine::search_image`].
    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Clusters one face: discards it as a duplicate, attaches it to the
    /// closest person, or creates a new person for it.
    pub async fn insert_face(&self, user: &UserId, face: FaceInput) -> FaceIdResult<Assignment> {
        self.check_dim(&face.vector);
        let _guard = self.locks.write(user).await;

        let persons = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?;
        let ids: Vec<PersonId> = candidates(&face.vector, &persons, &self.cfg)
            .into_iter()
            .map(|p| p.person_id.clone())
            .collect();
        let pool: Vec<Embedding> = self
            .fetch_embeddings(user, &ids)
            .await?
            .into_values()
            .flatten()
            .collect();

        let decision = decide(&classify(&face.vector, &pool, &self.cfg));
        debug!(user = %user, candidates = ids.len(), pool = pool.len(), ?decision, "face classified");
        if let Decision::Duplicate(person_id) = &decision {
            info!(user = %user, person = %person_id, "duplicate face discarded");
            return Ok(decision.assignment());
        }

        let mut journal = Journal::new(user);
        if let Err(e) = self.commit_single(user, &face, &decision, &persons, &mut journal).await {
            warn!(user = %user, steps = journal.len(), error = %e, "insert failed, rolling back");
            journal.rollback(self.store.as_ref(), self.cfg.call_timeout()).await;
            return Err(e);
        }

        let assignment = decision.assignment();
        info!(
            user = %user,
            person = %assignment.person_id,
            created = assignment.created,
            "face inserted"
        );
        Ok(assignment)
    }

    /// Clusters a batch of faces in arrival order, also grouping faces of
    /// the batch with each other. Returns one assignment per face. Either
    /// the whole batch is committed or nothing is.
    pub async fn insert_batch(&self, user: &UserId, faces: Vec<FaceInput>) -> FaceIdResult<Vec<Assignment>> {
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        for face in &faces {
            self.check_dim(&face.vector);
        }
        let _guard = self.locks.write(user).await;

        let persons = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?;

        let mut planner = BatchPlanner::new(&self.cfg, &persons);
        for face in &faces {
            if let Some(person_id) = planner.nearest_persisted(&face.vector).cloned() {
                if planner.needs_members(&person_id) {
                    let embs = self
                        .call(
                            "find_embeddings_by_person",
                            self.store.find_embeddings_by_person(user, &person_id),
                        )
                        .await?;
                    planner.load_members(&person_id, &embs);
                }
            }
            planner.assign(face);
        }
        let plan = planner.finish();

        let mut journal = Journal::new(user);
        let res = self
            .commit_batch(user, &faces, &plan.new_persons(&self.cfg.default_person_name), &plan.assignments, &persons, &mut journal)
            .await;
        if let Err(e) = res {
            warn!(user = %user, faces = faces.len(), steps = journal.len(), error = %e, "batch failed, rolling back");
            journal.rollback(self.store.as_ref(), self.cfg.call_timeout()).await;
            return Err(e);
        }

        info!(
            user = %user,
            faces = faces.len(),
            new_persons = plan.clusters.len(),
            duplicates = plan.assignments.iter().filter(|a| a.duplicate).count(),
            "batch inserted"
        );
        Ok(plan.assignments)
    }

    /// Finds the persons matching any of `queries`, best match per person,
    /// sorted by descending score. Unknown users yield no hits.
    ///
    /// Waits for an in-flight write of the same user, so rows of an
    /// operation that is later rolled back are never returned.
    pub async fn search(&self, user: &UserId, queries: &[Vec<f32>]) -> FaceIdResult<Vec<SearchHit>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.locks.read(user).await;
        let persons = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?;
        let ids = search::candidate_ids(queries, &persons, &self.cfg);
        let embeddings = self.fetch_embeddings(user, &ids).await?;
        let hits = search::rank(queries, &persons, &embeddings, &self.cfg);
        debug!(user = %user, queries = queries.len(), candidates = ids.len(), hits = hits.len(), "search done");
        Ok(hits)
    }

    /// Deletes a person and every embedding it owns. Unknown ids are a no-op.
    pub async fn delete_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()> {
        let _guard = self.locks.write(user).await;
        let centroid = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?
            .into_iter()
            .find(|p| &p.person_id == person)
            .and_then(|p| p.centroid);
        self.remove_person(user, person, centroid).await?;
        info!(user = %user, person = %person, "person deleted");
        Ok(())
    }

    /// Deletes one embedding and recomputes its person's centroid.
    /// Returns false if the embedding does not exist.
    pub async fn delete_embedding(&self, user: &UserId, embedding: &EmbeddingId) -> FaceIdResult<bool> {
        let _guard = self.locks.write(user).await;
        let Some(removed) = self
            .call("delete_embedding", self.store.delete_embedding(user, embedding))
            .await?
        else {
            return Ok(false);
        };
        self.recompute_centroid(user, &removed.person_id).await?;
        info!(user = %user, embedding = %embedding, person = %removed.person_id, "embedding deleted");
        Ok(true)
    }

    /// Deletes all persons and embeddings of a user. Returns the number of
    /// persons removed.
    ///
    /// Persons are removed one at a time. On failure the persons already
    /// removed stay removed and the others are left intact, so calling it
    /// again completes the reset.
    pub async fn reset_user(&self, user: &UserId) -> FaceIdResult<usize> {
        let _guard = self.locks.write(user).await;
        let persons = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?;
        let embeddings = self
            .call("find_embeddings_by_user", self.store.find_embeddings_by_user(user))
            .await?;

        let removed = persons.len();
        let mut seen: HashSet<PersonId> = persons.iter().map(|p| p.person_id.clone()).collect();
        let mut targets: Vec<(PersonId, Option<Vec<f32>>)> =
            persons.into_iter().map(|p| (p.person_id, p.centroid)).collect();
        // Embeddings whose person row is gone.
        for e in embeddings {
            if seen.insert(e.person_id.clone()) {
                targets.push((e.person_id, None));
            }
        }

        for (id, centroid) in targets {
            self.remove_person(user, &id, centroid).await?;
        }
        info!(user = %user, persons = removed, "user reset");
        Ok(removed)
    }

    /// Removes a person in an order that leaves a consistent row behind on
    /// failure: the centroid is cleared first, then the embeddings, then the
    /// row. A failed embedding delete restores the centroid.
    async fn remove_person(&self, user: &UserId, id: &PersonId, centroid: Option<Vec<f32>>) -> FaceIdResult<()> {
        let indexed = centroid.is_some();
        if indexed {
            self.call(
                "update_person_centroid",
                self.store.update_person_centroid(user, id, None),
            )
            .await?;
        }

        let res = self
            .call(
                "delete_embeddings_by_person",
                self.store.delete_embeddings_by_person(user, id),
            )
            .await;
        if let Err(e) = res {
            if indexed {
                let mut journal = Journal::new(user);
                journal.centroid_replaced(id.clone(), centroid);
                journal.rollback(self.store.as_ref(), self.cfg.call_timeout()).await;
            }
            warn!(user = %user, person = %id, error = %e, "person delete failed");
            return Err(e);
        }

        // From here on a leftover row is Unindexed with no embeddings.
        self.call("delete_person", self.store.delete_person(user, id))
            .await
    }

    /// Changes a person's display name. Returns `None` for unknown persons.
    pub async fn rename_person(&self, user: &UserId, person: &PersonId, name: &str) -> FaceIdResult<Option<Person>> {
        let _guard = self.locks.write(user).await;
        self.call("rename_person", self.store.rename_person(user, person, name))
            .await
    }

    /// Lists a user's persons, newest first.
    pub async fn list_persons(&self, user: &UserId) -> FaceIdResult<Vec<Person>> {
        let _guard = self.locks.read(user).await;
        let mut persons = self
            .call("find_persons_by_user", self.store.find_persons_by_user(user))
            .await?;
        persons.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(persons)
    }

    pub async fn list_embeddings(&self, user: &UserId) -> FaceIdResult<Vec<Embedding>> {
        let _guard = self.locks.read(user).await;
        self.call("find_embeddings_by_user", self.store.find_embeddings_by_user(user))
            .await
    }

    /// Detects the faces of an image and clusters them as one batch.
    pub async fn ingest_image(
        &self,
        user: &UserId,
        image: &[u8],
        image_ref: &str,
        source: Source,
    ) -> FaceIdResult<Vec<Assignment>> {
        let faces = self.detect(image).await?;
        debug!(user = %user, image = image_ref, faces = faces.len(), "faces detected");
        let inputs = faces
            .into_iter()
            .map(|f| FaceInput {
                vector: f.vector,
                image_ref: image_ref.to_string(),
                source,
                thumbnail: f.thumbnail,
            })
            .collect();
        self.insert_batch(user, inputs).await
    }

    /// Detects the faces of a query image and searches for all of them.
    pub async fn search_image(&self, user: &UserId, image: &[u8]) -> FaceIdResult<Vec<SearchHit>> {
        let queries: Vec<Vec<f32>> = self
            .detect(image)
            .await?
            .into_iter()
            .map(|f| f.vector)
            .collect();
        self.search(user, &queries).await
    }

    async fn detect(&self, image: &[u8]) -> FaceIdResult<Vec<crate::detector::DetectedFace>> {
        let detector = self.detector.as_ref().ok_or(FaceIdError::NoDetector)?;
        self.call("detect", detector.detect(image)).await
    }

    async fn commit_single(
        &self,
        user: &UserId,
        face: &FaceInput,
        decision: &Decision,
        persons: &[Person],
        journal: &mut Journal,
    ) -> FaceIdResult<()> {
        let person_id = decision.person_id();
        if let Decision::Create(id) = decision {
            let new_person = NewPerson {
                person_id: id.clone(),
                name: self.cfg.default_person_name.clone(),
                thumbnail: Some(face.thumbnail_or_image()),
            };
            self.call("create_person", self.store.create_person(user, new_person))
                .await?;
            journal.person_created(id.clone());
        }

        let e = self
            .call(
                "create_embedding",
                self.store.create_embedding(user, new_embedding(person_id, face)),
            )
            .await?;
        journal.embedding_created(e.embedding_id);

        self.refresh_centroids(user, std::slice::from_ref(person_id), persons, journal)
            .await
    }

    async fn commit_batch(
        &self,
        user: &UserId,
        faces: &[FaceInput],
        new_persons: &[NewPerson],
        assignments: &[Assignment],
        persons: &[Person],
        journal: &mut Journal,
    ) -> FaceIdResult<()> {
        // Persons first: no embedding may reference a person that is missing.
        for np in new_persons {
            self.call("create_person", self.store.create_person(user, np.clone()))
                .await?;
            journal.person_created(np.person_id.clone());
        }

        let mut touched: Vec<PersonId> = Vec::new();
        let mut seen: HashSet<&PersonId> = HashSet::new();
        for (face, a) in faces.iter().zip(assignments) {
            if a.duplicate {
                continue;
            }
            let e = self
                .call(
                    "create_embedding",
                    self.store.create_embedding(user, new_embedding(&a.person_id, face)),
                )
                .await?;
            journal.embedding_created(e.embedding_id);
            if seen.insert(&a.person_id) {
                touched.push(a.person_id.clone());
            }
        }

        // Once per person, not once per face.
        self.refresh_centroids(user, &touched, persons, journal).await
    }

    /// Recomputes and stores the centroids of `ids`, journaling the values
    /// they replace.
    async fn refresh_centroids(
        &self,
        user: &UserId,
        ids: &[PersonId],
        persons: &[Person],
        journal: &mut Journal,
    ) -> FaceIdResult<()> {
        let previous: HashMap<&PersonId, &Option<Vec<f32>>> =
            persons.iter().map(|p| (&p.person_id, &p.centroid)).collect();
        for id in ids {
            let embs = self
                .call(
                    "find_embeddings_by_person",
                    self.store.find_embeddings_by_person(user, id),
                )
                .await?;
            let c = centroid::compute(&embs, self.cfg.dim);
            self.call(
                "update_person_centroid",
                self.store.update_person_centroid(user, id, c),
            )
            .await?;
            journal.centroid_replaced(id.clone(), previous.get(id).and_then(|c| (*c).clone()));
        }
        Ok(())
    }

    async fn recompute_centroid(&self, user: &UserId, id: &PersonId) -> FaceIdResult<()> {
        let embs = self
            .call(
                "find_embeddings_by_person",
                self.store.find_embeddings_by_person(user, id),
            )
            .await?;
        let c = centroid::compute(&embs, self.cfg.dim);
        if c.is_none() {
            debug!(user = %user, person = %id, "person has no valid embeddings, now unindexed");
        }
        self.call(
            "update_person_centroid",
            self.store.update_person_centroid(user, id, c),
        )
        .await
    }

    /// Loads the embeddings of `ids` concurrently.
    async fn fetch_embeddings(&self, user: &UserId, ids: &[PersonId]) -> FaceIdResult<HashMap<PersonId, Vec<Embedding>>> {
        let lists = try_join_all(ids.iter().map(|id| {
            self.call(
                "find_embeddings_by_person",
                self.store.find_embeddings_by_person(user, id),
            )
        }))
        .await?;
        Ok(ids.iter().cloned().zip(lists).collect())
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> FaceIdResult<T>
    where
        F: Future<Output = FaceIdResult<T>>,
    {
        bounded(op, self.cfg.call_timeout(), fut).await
    }

    fn check_dim(&self, vector: &[f32]) {
        if vector.len() != self.cfg.dim {
            warn!(
                expected = self.cfg.dim,
                got = vector.len(),
                "face vector has wrong dimension and will never match"
            );
        }
    }
}

fn new_embedding(person_id: &PersonId, face: &FaceInput) -> NewEmbedding {
    NewEmbedding {
        person_id: person_id.clone(),
        vector: face.vector.clone(),
        image_ref: face.image_ref.clone(),
        source: face.source,
    }
}

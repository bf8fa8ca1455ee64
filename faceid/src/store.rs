use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{FaceIdError, FaceIdResult};
use crate::types::{Embedding, EmbeddingId, NewEmbedding, NewPerson, Person, PersonId, UserId};

/// Persists persons and embeddings, partitioned by user.
///
/// Implementations must be safe for concurrent use. Missing users, persons
/// or embeddings are never errors: reads return empty results and deletes
/// are no-ops.
/// Use [`MemoryStore`] for in-memory storage (testing/ephemeral).
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Creates a person with the given id and no centroid.
    async fn create_person(&self, user: &UserId, person: NewPerson) -> FaceIdResult<Person>;

    /// Sets or clears the centroid of a person.
    async fn update_person_centroid(
        &self,
        user: &UserId,
        person: &PersonId,
        centroid: Option<Vec<f32>>,
    ) -> FaceIdResult<()>;

    /// Changes the display name. Returns `None` if the person does not exist.
    async fn rename_person(
        &self,
        user: &UserId,
        person: &PersonId,
        name: &str,
    ) -> FaceIdResult<Option<Person>>;

    async fn find_persons_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Person>>;

    /// Stores an embedding. The referenced person must exist.
    async fn create_embedding(&self, user: &UserId, embedding: NewEmbedding) -> FaceIdResult<Embedding>;

    async fn find_embeddings_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Embedding>>;

    async fn find_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<Vec<Embedding>>;

    /// Removes one embedding and returns it.
    async fn delete_embedding(&self, user: &UserId, embedding: &EmbeddingId) -> FaceIdResult<Option<Embedding>>;

    async fn delete_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()>;

    async fn delete_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()>;
}

/// One user's persons and embeddings.
#[derive(Default)]
struct Partition {
    persons: HashMap<PersonId, Person>,
    embeddings: HashMap<PersonId, Vec<Embedding>>,
}

/// In-memory [`Persistence`] implementation.
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, Partition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn create_person(&self, user: &UserId, person: NewPerson) -> FaceIdResult<Person> {
        let mut users = self.users.write();
        let part = users.entry(user.clone()).or_default();
        if part.persons.contains_key(&person.person_id) {
            return Err(FaceIdError::Store(format!(
                "person {} already exists",
                person.person_id
            )));
        }
        let p = Person {
            person_id: person.person_id,
            user_id: user.clone(),
            name: person.name,
            thumbnail: person.thumbnail,
            centroid: None,
            created_at: Utc::now(),
        };
        part.persons.insert(p.person_id.clone(), p.clone());
        Ok(p)
    }

    async fn update_person_centroid(
        &self,
        user: &UserId,
        person: &PersonId,
        centroid: Option<Vec<f32>>,
    ) -> FaceIdResult<()> {
        let mut users = self.users.write();
        if let Some(p) = users.get_mut(user).and_then(|part| part.persons.get_mut(person)) {
            p.centroid = centroid;
        }
        Ok(())
    }

    async fn rename_person(
        &self,
        user: &UserId,
        person: &PersonId,
        name: &str,
    ) -> FaceIdResult<Option<Person>> {
        let mut users = self.users.write();
        Ok(users
            .get_mut(user)
            .and_then(|part| part.persons.get_mut(person))
            .map(|p| {
                p.name = name.to_string();
                p.clone()
            }))
    }

    async fn find_persons_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Person>> {
        let users = self.users.read();
        let mut persons: Vec<Person> = users
            .get(user)
            .map(|part| part.persons.values().cloned().collect())
            .unwrap_or_default();
        persons.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(persons)
    }

    async fn create_embedding(&self, user: &UserId, embedding: NewEmbedding) -> FaceIdResult<Embedding> {
        let mut users = self.users.write();
        let part = users
            .get_mut(user)
            .filter(|part| part.persons.contains_key(&embedding.person_id))
            .ok_or_else(|| {
                FaceIdError::Store(format!("unknown person {}", embedding.person_id))
            })?;
        let e = Embedding {
            embedding_id: EmbeddingId::generate(),
            user_id: user.clone(),
            person_id: embedding.person_id,
            vector: embedding.vector,
            image_ref: embedding.image_ref,
            source: embedding.source,
            created_at: Utc::now(),
        };
        part.embeddings
            .entry(e.person_id.clone())
            .or_default()
            .push(e.clone());
        Ok(e)
    }

    async fn find_embeddings_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Embedding>> {
        let users = self.users.read();
        let mut all: Vec<Embedding> = users
            .get(user)
            .map(|part| part.embeddings.values().flatten().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<Vec<Embedding>> {
        let users = self.users.read();
        Ok(users
            .get(user)
            .and_then(|part| part.embeddings.get(person))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_embedding(&self, user: &UserId, embedding: &EmbeddingId) -> FaceIdResult<Option<Embedding>> {
        let mut users = self.users.write();
        let Some(part) = users.get_mut(user) else {
            return Ok(None);
        };
        for list in part.embeddings.values_mut() {
            if let Some(pos) = list.iter().position(|e| &e.embedding_id == embedding) {
                return Ok(Some(list.remove(pos)));
            }
        }
        Ok(None)
    }

    async fn delete_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()> {
        let mut users = self.users.write();
        if let Some(part) = users.get_mut(user) {
            part.persons.remove(person);
            if part.persons.is_empty() && part.embeddings.values().all(Vec::is_empty) {
                users.remove(user);
            }
        }
        Ok(())
    }

    async fn delete_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()> {
        let mut users = self.users.write();
        if let Some(part) = users.get_mut(user) {
            part.embeddings.remove(person);
        }
        Ok(())
    }
}

//! Redb-based persistent face store.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use facelink_faceid::{
    Embedding, EmbeddingId, FaceIdError, FaceIdResult, NewEmbedding, NewPerson, Person,
    Persistence, PersonId, UserId,
};

use crate::keys::{self, SEP};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("faces");

/// A persistent [`Persistence`] backed by a single redb table.
///
/// Every trait operation runs in one redb transaction, so each call is
/// atomic on its own. Calls block the current thread for the duration of
/// the transaction.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> FaceIdResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(store_err)?;

        // Create the table if it doesn't exist
        let tx = db.begin_write().map_err(store_err)?;
        {
            let _ = tx.open_table(TABLE).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;

        info!(path = %path.display(), "face store opened");
        Ok(Self { db })
    }

    fn scan_prefix(&self, prefix: &str) -> FaceIdResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(TABLE).map_err(store_err)?;
        scan(&table, prefix)
    }

    /// Reads, modifies and rewrites one person. Returns `None` if it does
    /// not exist.
    fn update_person<F>(&self, user: &UserId, person: &PersonId, f: F) -> FaceIdResult<Option<Person>>
    where
        F: FnOnce(&mut Person),
    {
        check_ids(user, Some(person))?;
        let key = keys::person_key(user, person);
        let tx = self.db.begin_write().map_err(store_err)?;
        let updated = {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            let current = table
                .get(key.as_str())
                .map_err(store_err)?
                .map(|v| v.value().to_vec());
            match current {
                Some(bytes) => {
                    let mut p: Person = decode(&bytes)?;
                    f(&mut p);
                    table
                        .insert(key.as_str(), encode(&p)?.as_slice())
                        .map_err(store_err)?;
                    Some(p)
                }
                None => None,
            }
        };
        tx.commit().map_err(store_err)?;
        Ok(updated)
    }
}

#[async_trait]
impl Persistence for RedbStore {
    async fn create_person(&self, user: &UserId, person: NewPerson) -> FaceIdResult<Person> {
        check_ids(user, Some(&person.person_id))?;
        let key = keys::person_key(user, &person.person_id);
        let p = Person {
            person_id: person.person_id,
            user_id: user.clone(),
            name: person.name,
            thumbnail: person.thumbnail,
            centroid: None,
            created_at: Utc::now(),
        };

        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            if table.get(key.as_str()).map_err(store_err)?.is_some() {
                return Err(FaceIdError::Store(format!(
                    "person {} already exists",
                    p.person_id
                )));
            }
            table
                .insert(key.as_str(), encode(&p)?.as_slice())
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        debug!(user = %user, person = %p.person_id, "person stored");
        Ok(p)
    }

    async fn update_person_centroid(
        &self,
        user: &UserId,
        person: &PersonId,
        centroid: Option<Vec<f32>>,
    ) -> FaceIdResult<()> {
        self.update_person(user, person, |p| p.centroid = centroid)?;
        Ok(())
    }

    async fn rename_person(
        &self,
        user: &UserId,
        person: &PersonId,
        name: &str,
    ) -> FaceIdResult<Option<Person>> {
        self.update_person(user, person, |p| p.name = name.to_string())
    }

    async fn find_persons_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Person>> {
        check_ids(user, None)?;
        let mut persons = self
            .scan_prefix(&keys::persons_prefix(user))?
            .iter()
            .map(|(_, v)| decode::<Person>(v))
            .collect::<FaceIdResult<Vec<_>>>()?;
        persons.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        Ok(persons)
    }

    async fn create_embedding(&self, user: &UserId, embedding: NewEmbedding) -> FaceIdResult<Embedding> {
        check_ids(user, Some(&embedding.person_id))?;
        let e = Embedding {
            embedding_id: EmbeddingId::generate(),
            user_id: user.clone(),
            person_id: embedding.person_id,
            vector: embedding.vector,
            image_ref: embedding.image_ref,
            source: embedding.source,
            created_at: Utc::now(),
        };
        let person_key = keys::person_key(user, &e.person_id);
        let key = keys::embedding_key(user, &e.person_id, &e.embedding_id);
        let owner = keys::owner_key(user, &e.embedding_id);

        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            if table.get(person_key.as_str()).map_err(store_err)?.is_none() {
                return Err(FaceIdError::Store(format!("unknown person {}", e.person_id)));
            }
            table
                .insert(key.as_str(), encode(&e)?.as_slice())
                .map_err(store_err)?;
            table
                .insert(owner.as_str(), e.person_id.as_str().as_bytes())
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(e)
    }

    async fn find_embeddings_by_user(&self, user: &UserId) -> FaceIdResult<Vec<Embedding>> {
        check_ids(user, None)?;
        let mut all = self
            .scan_prefix(&keys::embeddings_prefix(user))?
            .iter()
            .map(|(_, v)| decode::<Embedding>(v))
            .collect::<FaceIdResult<Vec<_>>>()?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn find_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<Vec<Embedding>> {
        check_ids(user, Some(person))?;
        let mut embs = self
            .scan_prefix(&keys::person_embeddings_prefix(user, person))?
            .iter()
            .map(|(_, v)| decode::<Embedding>(v))
            .collect::<FaceIdResult<Vec<_>>>()?;
        embs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(embs)
    }

    async fn delete_embedding(&self, user: &UserId, embedding: &EmbeddingId) -> FaceIdResult<Option<Embedding>> {
        check_ids(user, None)?;
        keys::check_id("embedding", embedding.as_str())?;
        let owner = keys::owner_key(user, embedding);
        let tx = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            let person = table
                .remove(owner.as_str())
                .map_err(store_err)?
                .map(|v| String::from_utf8_lossy(v.value()).into_owned());
            match person {
                Some(person) => {
                    let key = keys::embedding_key(user, &PersonId::new(person), embedding);
                    let bytes = table
                        .remove(key.as_str())
                        .map_err(store_err)?
                        .map(|v| v.value().to_vec());
                    bytes.map(|b| decode::<Embedding>(&b)).transpose()?
                }
                None => None,
            }
        };
        tx.commit().map_err(store_err)?;
        Ok(removed)
    }

    async fn delete_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()> {
        check_ids(user, Some(person))?;
        let key = keys::person_key(user, person);
        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            table.remove(key.as_str()).map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    async fn delete_embeddings_by_person(&self, user: &UserId, person: &PersonId) -> FaceIdResult<()> {
        check_ids(user, Some(person))?;
        let prefix = keys::person_embeddings_prefix(user, person);
        let tx = self.db.begin_write().map_err(store_err)?;
        let removed = {
            let mut table = tx.open_table(TABLE).map_err(store_err)?;
            let doomed: Vec<String> = scan(&table, &prefix)?
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            for key in &doomed {
                table.remove(key.as_str()).map_err(store_err)?;
                if let Some(id) = key.rsplit(SEP).next() {
                    let owner = keys::owner_key(user, &EmbeddingId::new(id));
                    table.remove(owner.as_str()).map_err(store_err)?;
                }
            }
            doomed.len()
        };
        tx.commit().map_err(store_err)?;
        debug!(user = %user, person = %person, removed, "embeddings deleted");
        Ok(())
    }
}

/// Ids become key segments, so the separator must not appear in them.
fn check_ids(user: &UserId, person: Option<&PersonId>) -> FaceIdResult<()> {
    keys::check_id("user", user.as_str())?;
    match person {
        Some(p) => keys::check_id("person", p.as_str()),
        None => Ok(()),
    }
}

/// Collects the entries whose key starts with `prefix`, in key order.
fn scan<T>(table: &T, prefix: &str) -> FaceIdResult<Vec<(String, Vec<u8>)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for item in table.range(prefix..).map_err(store_err)? {
        let (key, value) = item.map_err(store_err)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        results.push((key.to_string(), value.value().to_vec()));
    }
    Ok(results)
}

fn encode<T: Serialize>(value: &T) -> FaceIdResult<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| FaceIdError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> FaceIdResult<T> {
    rmp_serde::from_slice(bytes).map_err(|e| FaceIdError::Serialization(e.to_string()))
}

fn store_err(e: impl std::fmt::Display) -> FaceIdError {
    FaceIdError::Store(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelink_faceid::{Config, Engine, FaceInput, Source};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn new_person(id: &str) -> NewPerson {
        NewPerson {
            person_id: id.into(),
            name: "Unknown Person".into(),
            thumbnail: Some("thumb".into()),
        }
    }

    fn new_emb(person: &str, v: Vec<f32>) -> NewEmbedding {
        NewEmbedding {
            person_id: person.into(),
            vector: v,
            image_ref: "img".into(),
            source: Source::GDrive,
        }
    }

    #[tokio::test]
    async fn test_person_roundtrip() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("faces.redb")).unwrap();
        let u = UserId::new("u1");

        store.create_person(&u, new_person("p1")).await.unwrap();
        assert!(store.create_person(&u, new_person("p1")).await.is_err());

        store
            .update_person_centroid(&u, &"p1".into(), Some(vec![0.5, 0.5]))
            .await
            .unwrap();
        let renamed = store.rename_person(&u, &"p1".into(), "Ada").await.unwrap().unwrap();
        assert_eq!(renamed.name, "Ada");
        assert_eq!(renamed.centroid, Some(vec![0.5, 0.5]));

        let persons = store.find_persons_by_user(&u).await.unwrap();
        assert_eq!(persons, vec![renamed]);
        assert!(store.find_persons_by_user(&UserId::new("u2")).await.unwrap().is_empty());
        assert!(store.rename_person(&u, &"ghost".into(), "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_embeddings_need_person() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("faces.redb")).unwrap();
        let u = UserId::new("u1");
        assert!(store.create_embedding(&u, new_emb("p1", vec![1.0])).await.is_err());
        assert!(store.find_embeddings_by_user(&u).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("faces.redb")).unwrap();
        let u = UserId::new("u1");
        store.create_person(&u, new_person("p1")).await.unwrap();
        store.create_person(&u, new_person("p10")).await.unwrap();

        let e1 = store.create_embedding(&u, new_emb("p1", vec![1.0, 0.0])).await.unwrap();
        store.create_embedding(&u, new_emb("p1", vec![0.9, 0.1])).await.unwrap();
        store.create_embedding(&u, new_emb("p10", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(store.find_embeddings_by_user(&u).await.unwrap().len(), 3);
        let p1 = store.find_embeddings_by_person(&u, &"p1".into()).await.unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].source, Source::GDrive);

        let removed = store.delete_embedding(&u, &e1.embedding_id).await.unwrap();
        assert_eq!(removed, Some(e1.clone()));
        assert_eq!(store.delete_embedding(&u, &e1.embedding_id).await.unwrap(), None);
        assert_eq!(store.delete_embedding(&UserId::new("u2"), &e1.embedding_id).await.unwrap(), None);

        store.delete_embeddings_by_person(&u, &"p1".into()).await.unwrap();
        assert!(store.find_embeddings_by_person(&u, &"p1".into()).await.unwrap().is_empty());
        assert_eq!(store.find_embeddings_by_person(&u, &"p10".into()).await.unwrap().len(), 1);

        store.delete_person(&u, &"p1".into()).await.unwrap();
        store.delete_person(&u, &"ghost".into()).await.unwrap();
        assert_eq!(store.find_persons_by_user(&u).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faces.redb");
        let u = UserId::new("u1");
        let assigned = {
            let engine = Engine::new(
                Config::with_dim(2),
                Arc::new(RedbStore::open(&path).unwrap()),
            )
            .unwrap();
            engine
                .insert_batch(
                    &u,
                    vec![
                        FaceInput::new(vec![1.0, 0.0], "a"),
                        FaceInput::new(vec![0.95, 0.05], "b"),
                    ],
                )
                .await
                .unwrap()
        };

        let engine = Engine::new(Config::with_dim(2), Arc::new(RedbStore::open(&path).unwrap())).unwrap();
        let persons = engine.list_persons(&u).await.unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].person_id, assigned[0].person_id);
        let c = persons[0].centroid.clone().unwrap();
        assert!((c[0] - 0.975).abs() < 1e-5 && (c[1] - 0.025).abs() < 1e-5);

        let hits = engine.search(&u, &[vec![1.0, 0.0]]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].image_ref, "a");

        assert_eq!(engine.reset_user(&u).await.unwrap(), 1);
        assert!(engine.list_embeddings(&u).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_with_separator_are_rejected() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RedbStore::open(dir.path().join("faces.redb")).unwrap());
        let engine = Engine::new(Config::with_dim(2), store.clone()).unwrap();
        let owner = UserId::new("a");
        engine
            .insert_face(&owner, FaceInput::new(vec![1.0, 0.0], "a.jpg"))
            .await
            .unwrap();

        // "a" + SEP + "p" would otherwise name the persons range of user "a".
        let forged = UserId::new(format!("a{SEP}p"));
        assert!(matches!(
            engine.list_persons(&forged).await,
            Err(FaceIdError::InvalidId(_))
        ));
        assert!(engine.search(&forged, &[vec![1.0, 0.0]]).await.is_err());
        assert!(engine.reset_user(&forged).await.is_err());
        assert!(engine
            .insert_face(&forged, FaceInput::new(vec![1.0, 0.0], "x.jpg"))
            .await
            .is_err());

        let bad_person = PersonId::new(format!("p{SEP}x"));
        assert!(store.create_person(&owner, new_person(bad_person.as_str())).await.is_err());
        assert!(store.delete_embeddings_by_person(&owner, &bad_person).await.is_err());

        assert_eq!(engine.list_persons(&owner).await.unwrap().len(), 1);
        assert_eq!(engine.list_embeddings(&owner).await.unwrap().len(), 1);
    }
}

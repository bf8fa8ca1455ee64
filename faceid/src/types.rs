use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque ownership scope. Nothing is ever visible across users.
    UserId
);
string_id!(
    /// Identifier of one clustered identity, unique across all users.
    PersonId
);
string_id!(EmbeddingId);

impl PersonId {
    /// Allocates a fresh globally unique person id.
    pub fn generate() -> Self {
        Self(format!("person_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl EmbeddingId {
    pub fn generate() -> Self {
        Self(format!("emb_{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Where the photograph of a face came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Local,
    GDrive,
}

/// Indexing state of a person, derived from its centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonState {
    /// No centroid yet. Always kept by the coarse stage.
    Unindexed,
    Indexed,
}

/// One clustered identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub person_id: PersonId,
    pub user_id: UserId,
    pub name: String,
    pub thumbnail: Option<String>,
    /// Elementwise mean of the person's valid embeddings; `None` when it has none.
    pub centroid: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Person {
    pub fn state(&self) -> PersonState {
        match self.centroid {
            Some(_) => PersonState::Indexed,
            None => PersonState::Unindexed,
        }
    }
}

/// One detected face instance. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub embedding_id: EmbeddingId,
    pub user_id: UserId,
    pub person_id: PersonId,
    pub vector: Vec<f32>,
    pub image_ref: String,
    pub source: Source,
    pub created_at: DateTime<Utc>,
}

/// Person row to create. The id is allocated by the assignor.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub person_id: PersonId,
    pub name: String,
    pub thumbnail: Option<String>,
}

/// Embedding row to create.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub person_id: PersonId,
    pub vector: Vec<f32>,
    pub image_ref: String,
    pub source: Source,
}

/// A face submitted for clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceInput {
    pub vector: Vec<f32>,
    pub image_ref: String,
    #[serde(default)]
    pub source: Source,
    /// Crop used as the person thumbnail if this face creates a person.
    /// Falls back to `image_ref`.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl FaceInput {
    pub fn new(vector: Vec<f32>, image_ref: impl Into<String>) -> Self {
        Self {
            vector,
            image_ref: image_ref.into(),
            source: Source::Local,
            thumbnail: None,
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub(crate) fn thumbnail_or_image(&self) -> String {
        self.thumbnail
            .clone()
            .unwrap_or_else(|| self.image_ref.clone())
    }
}

/// Outcome of clustering one face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub person_id: PersonId,
    /// A new person was created for this face.
    pub created: bool,
    /// The face was already represented and nothing was stored.
    pub duplicate: bool,
}

/// Discrete confidence label of a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        };
        f.write_str(s)
    }
}

/// One ranked search result: the best embedding of a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub person_id: PersonId,
    pub embedding_id: EmbeddingId,
    pub image_ref: String,
    pub distance: f32,
    /// `1 - distance`.
    pub score: f32,
    pub tier: ConfidenceTier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_person_ids_are_unique() {
        let a = PersonId::generate();
        let b = PersonId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("person_"));
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Source::Local).unwrap(), r#""local""#);
        assert_eq!(serde_json::to_string(&Source::GDrive).unwrap(), r#""gdrive""#);
        let s: Source = serde_json::from_str(r#""gdrive""#).unwrap();
        assert_eq!(s, Source::GDrive);
    }

    #[test]
    fn face_input_defaults_source_and_thumbnail() {
        let face: FaceInput =
            serde_json::from_str(r#"{"vector": [1.0, 0.0], "image_ref": "img_1"}"#).unwrap();
        assert_eq!(face.source, Source::Local);
        assert_eq!(face.thumbnail_or_image(), "img_1");
        let face = face.with_thumbnail("crop_1");
        assert_eq!(face.thumbnail_or_image(), "crop_1");
    }

    #[test]
    fn person_state_follows_centroid() {
        let mut p = Person {
            person_id: "p".into(),
            user_id: "u".into(),
            name: "n".into(),
            thumbnail: None,
            centroid: None,
            created_at: Utc::now(),
        };
        assert_eq!(p.state(), PersonState::Unindexed);
        p.centroid = Some(vec![0.0, 1.0]);
        assert_eq!(p.state(), PersonState::Indexed);
    }
}

//! Key layout of the face table.
//!
//! Segments are joined with the ASCII unit separator (`0x1F`). Ids that
//! contain it are rejected by [`check_id`] before any key is built, so a
//! user's rows form one contiguous range and no id's prefix is ever a
//! prefix of another id's keys.
//!
//! ```text
//! {user}␟p␟{person}              -> Person
//! {user}␟e␟{person}␟{embedding}  -> Embedding
//! {user}␟x␟{embedding}           -> person id (reverse index)
//! ```

use facelink_faceid::{EmbeddingId, FaceIdError, FaceIdResult, PersonId, UserId};

pub(crate) const SEP: char = '\x1F';

/// Rejects ids that are empty or contain the key separator.
pub fn check_id(kind: &str, id: &str) -> FaceIdResult<()> {
    if id.is_empty() || id.contains(SEP) {
        return Err(FaceIdError::InvalidId(format!("{kind} id {id:?} is empty or contains 0x1F")));
    }
    Ok(())
}

pub fn person_key(user: &UserId, person: &PersonId) -> String {
    format!("{user}{SEP}p{SEP}{person}")
}

/// Prefix of all persons of a user.
pub fn persons_prefix(user: &UserId) -> String {
    format!("{user}{SEP}p{SEP}")
}

pub fn embedding_key(user: &UserId, person: &PersonId, embedding: &EmbeddingId) -> String {
    format!("{user}{SEP}e{SEP}{person}{SEP}{embedding}")
}

/// Prefix of all embeddings of a user.
pub fn embeddings_prefix(user: &UserId) -> String {
    format!("{user}{SEP}e{SEP}")
}

/// Prefix of all embeddings of one person.
pub fn person_embeddings_prefix(user: &UserId, person: &PersonId) -> String {
    format!("{user}{SEP}e{SEP}{person}{SEP}")
}

/// Reverse index from embedding id to owning person.
pub fn owner_key(user: &UserId, embedding: &EmbeddingId) -> String {
    format!("{user}{SEP}x{SEP}{embedding}")
}

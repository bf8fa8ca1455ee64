//! Fine stage: exact comparison against the embeddings of candidate persons.

use std::collections::HashMap;

use crate::config::Config;
use crate::distance::distance_dim;
use crate::types::{ConfidenceTier, Embedding, PersonId};

/// Classification of a face against a set of embeddings.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<'a> {
    /// Below `duplicate_threshold`: the face is already represented.
    Duplicate { embedding: &'a Embedding, distance: f32 },
    /// Below `match_threshold`: the closest person.
    Match { person_id: PersonId, distance: f32 },
    NoMatch,
}

/// Closest embedding of one person.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch<'a> {
    pub embedding: &'a Embedding,
    pub distance: f32,
}

/// Classifies `query` against `embeddings`, using the closest one.
pub fn classify<'a>(query: &[f32], embeddings: &'a [Embedding], cfg: &Config) -> Verdict<'a> {
    let mut best: Option<BestMatch<'a>> = None;
    for e in embeddings {
        let d = distance_dim(query, &e.vector, cfg.dim);
        if best.is_none_or(|b| d < b.distance) {
            best = Some(BestMatch { embedding: e, distance: d });
        }
    }

    match best {
        Some(b) if b.distance < cfg.duplicate_threshold => Verdict::Duplicate {
            embedding: b.embedding,
            distance: b.distance,
        },
        Some(b) if b.distance < cfg.match_threshold => Verdict::Match {
            person_id: b.embedding.person_id.clone(),
            distance: b.distance,
        },
        _ => Verdict::NoMatch,
    }
}

/// Keeps, for every person, its closest embedding below `match_threshold`.
pub fn best_per_person<'a, I>(query: &[f32], embeddings: I, cfg: &Config) -> HashMap<PersonId, BestMatch<'a>>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let mut best: HashMap<PersonId, BestMatch<'a>> = HashMap::new();
    for e in embeddings {
        let d = distance_dim(query, &e.vector, cfg.dim);
        if d >= cfg.match_threshold {
            continue;
        }
        match best.get_mut(&e.person_id) {
            Some(b) if b.distance <= d => {}
            Some(b) => *b = BestMatch { embedding: e, distance: d },
            None => {
                best.insert(e.person_id.clone(), BestMatch { embedding: e, distance: d });
            }
        }
    }
    best
}

/// Reports whether `query` duplicates any of `vectors`.
pub fn is_duplicate<V: AsRef<[f32]>>(query: &[f32], vectors: &[V], cfg: &Config) -> bool {
    vectors
        .iter()
        .any(|v| distance_dim(query, v.as_ref(), cfg.dim) < cfg.duplicate_threshold)
}

/// Maps a match distance to its confidence band. `None` at or past
/// `match_threshold`.
pub fn tier(distance: f32, cfg: &Config) -> Option<ConfidenceTier> {
    if distance < cfg.high_confidence_below {
        Some(ConfidenceTier::High)
    } else if distance < cfg.medium_confidence_below {
        Some(ConfidenceTier::Medium)
    } else if distance < cfg.match_threshold {
        Some(ConfidenceTier::Low)
    } else {
        None
    }
}

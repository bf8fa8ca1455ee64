//! Ranked search over one or more query vectors.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::filter::candidates;
use crate::matcher::{best_per_person, tier, BestMatch};
use crate::types::{Embedding, Person, PersonId, SearchHit};

/// Union of the coarse-stage candidates of every query, in first-seen order.
pub fn candidate_ids(queries: &[Vec<f32>], persons: &[Person], cfg: &Config) -> Vec<PersonId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for q in queries {
        for p in candidates(q, persons, cfg) {
            if seen.insert(&p.person_id) {
                ids.push(p.person_id.clone());
            }
        }
    }
    ids
}

/// Runs the coarse and fine stages for each query and merges the results.
///
/// `embeddings` must hold the embeddings of every id returned by
/// [`candidate_ids`]. Each person appears at most once, with its globally
/// closest embedding. Hits are sorted by descending score, ties by person id.
pub fn rank(
    queries: &[Vec<f32>],
    persons: &[Person],
    embeddings: &HashMap<PersonId, Vec<Embedding>>,
    cfg: &Config,
) -> Vec<SearchHit> {
    let mut merged: HashMap<PersonId, BestMatch<'_>> = HashMap::new();

    for q in queries {
        let pool = candidates(q, persons, cfg)
            .into_iter()
            .filter_map(|p| embeddings.get(&p.person_id))
            .flatten();
        for (person_id, m) in best_per_person(q, pool, cfg) {
            match merged.get_mut(&person_id) {
                Some(prev) if prev.distance <= m.distance => {}
                Some(prev) => *prev = m,
                None => {
                    merged.insert(person_id, m);
                }
            }
        }
    }

    let mut hits: Vec<SearchHit> = merged
        .into_iter()
        .filter_map(|(person_id, m)| {
            tier(m.distance, cfg).map(|tier| SearchHit {
                person_id,
                embedding_id: m.embedding.embedding_id.clone(),
                image_ref: m.embedding.image_ref.clone(),
                distance: m.distance,
                score: 1.0 - m.distance,
                tier,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.person_id.cmp(&b.person_id))
    });
    hits
}

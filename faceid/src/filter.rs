//! Coarse stage: prune persons by centroid distance before exact matching.

use crate::config::Config;
use crate::distance::distance_dim;
use crate::types::Person;

/// Returns the persons worth comparing embedding by embedding.
///
/// A person is kept when its centroid lies below `coarse_threshold` of the
/// query. Persons without a centroid are always kept: nothing is known
/// about them yet, so they cannot be pruned.
pub fn candidates<'a>(query: &[f32], persons: &'a [Person], cfg: &Config) -> Vec<&'a Person> {
    persons
        .iter()
        .filter(|p| match &p.centroid {
            Some(c) => distance_dim(query, c, cfg.dim) < cfg.coarse_threshold,
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cfg() -> Config {
        Config::with_dim(2)
    }

    fn person(id: &str, centroid: Option<Vec<f32>>) -> Person {
        Person {
            person_id: id.into(),
            user_id: "u".into(),
            name: "n".into(),
            thumbnail: None,
            centroid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn keeps_near_and_drops_far() {
        let persons = vec![
            person("near", Some(vec![1.0, 0.0])),
            person("far", Some(vec![5.0, 5.0])),
        ];
        let got = candidates(&[0.9, 0.1], &persons, &cfg());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].person_id.as_str(), "near");
    }

    #[test]
    fn keeps_between_match_and_coarse() {
        // 0.7 is past a 0.6 match but inside the 0.75 coarse bound.
        let persons = vec![person("edge", Some(vec![0.7, 0.0]))];
        assert_eq!(candidates(&[0.0, 0.0], &persons, &cfg()).len(), 1);
    }

    #[test]
    fn always_keeps_unindexed() {
        let persons = vec![person("new", None), person("far", Some(vec![9.0, 9.0]))];
        let got = candidates(&[0.0, 0.0], &persons, &cfg());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].person_id.as_str(), "new");
    }

    #[test]
    fn malformed_centroid_is_pruned() {
        let persons = vec![person("bad", Some(vec![1.0, 0.0, 0.0]))];
        assert!(candidates(&[1.0, 0.0], &persons, &cfg()).is_empty());
    }

    #[test]
    fn wrong_dimension_query_prunes_everything_indexed() {
        let persons = vec![person("odd", Some(vec![1.0, 0.0, 0.0])), person("new", None)];
        let got = candidates(&[1.0, 0.0, 0.0], &persons, &cfg());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].person_id.as_str(), "new");
    }

    #[test]
    fn empty_input() {
        assert!(candidates(&[1.0], &[], &cfg()).is_empty());
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FaceIdError, FaceIdResult};

/// Name given to persons created by the assignor.
pub const DEFAULT_PERSON_NAME: &str = "Unknown Person";

/// Controls clustering and search behavior.
///
/// Every threshold is a Euclidean distance. The same values drive the
/// insert and search paths; components receive them explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Descriptor length (128 for the usual face recognition nets).
    /// Embeddings of any other length are ignored by centroid computation.
    pub dim: usize,

    /// Below this distance a face is already represented and is discarded.
    /// Default: 0.02.
    pub duplicate_threshold: f32,

    /// Below this distance a face belongs to the compared person.
    /// Default: 0.6.
    pub match_threshold: f32,

    /// Centroid pruning bound for the coarse stage. Looser than
    /// `match_threshold` so that recall is kept. Default: 0.75.
    pub coarse_threshold: f32,

    /// Batch step 1: distance to a persisted centroid (T1). Default: 0.55.
    pub batch_persisted_threshold: f32,

    /// Batch step 2: distance to a batch cluster representative (T2).
    /// Default: 0.50.
    pub batch_local_threshold: f32,

    /// Search hits closer than this are High confidence. Default: 0.4.
    pub high_confidence_below: f32,

    /// Search hits closer than this are Medium confidence; the Low tier ends
    /// at `match_threshold`. Default: 0.5.
    pub medium_confidence_below: f32,

    /// Upper bound for every persistence or detector call, in milliseconds.
    /// Default: 10000.
    pub call_timeout_ms: u64,

    /// Display name of newly created persons.
    pub default_person_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 128,
            duplicate_threshold: 0.02,
            match_threshold: 0.6,
            coarse_threshold: 0.75,
            batch_persisted_threshold: 0.55,
            batch_local_threshold: 0.50,
            high_confidence_below: 0.4,
            medium_confidence_below: 0.5,
            call_timeout_ms: 10_000,
            default_person_name: DEFAULT_PERSON_NAME.to_string(),
        }
    }
}

impl Config {
    /// Returns a config for the given descriptor length with default thresholds.
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Replaces zero or empty fields with their defaults.
    pub fn with_defaults(mut self) -> Self {
        let d = Self::default();
        if self.dim == 0 {
            self.dim = d.dim;
        }
        if self.duplicate_threshold == 0.0 {
            self.duplicate_threshold = d.duplicate_threshold;
        }
        if self.match_threshold == 0.0 {
            self.match_threshold = d.match_threshold;
        }
        if self.coarse_threshold == 0.0 {
            self.coarse_threshold = d.coarse_threshold;
        }
        if self.batch_persisted_threshold == 0.0 {
            self.batch_persisted_threshold = d.batch_persisted_threshold;
        }
        if self.batch_local_threshold == 0.0 {
            self.batch_local_threshold = d.batch_local_threshold;
        }
        if self.high_confidence_below == 0.0 {
            self.high_confidence_below = d.high_confidence_below;
        }
        if self.medium_confidence_below == 0.0 {
            self.medium_confidence_below = d.medium_confidence_below;
        }
        if self.call_timeout_ms == 0 {
            self.call_timeout_ms = d.call_timeout_ms;
        }
        if self.default_person_name.is_empty() {
            self.default_person_name = d.default_person_name;
        }
        self
    }

    /// Checks that the thresholds are ordered consistently.
    pub fn validate(&self) -> FaceIdResult<()> {
        if self.dim == 0 {
            return Err(FaceIdError::InvalidConfig("dim must be positive".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(FaceIdError::InvalidConfig(
                "call_timeout_ms must be positive".into(),
            ));
        }
        if !(self.duplicate_threshold > 0.0 && self.duplicate_threshold < self.match_threshold) {
            return Err(FaceIdError::InvalidConfig(format!(
                "duplicate_threshold {} must be in (0, match_threshold {})",
                self.duplicate_threshold, self.match_threshold
            )));
        }
        if self.coarse_threshold < self.match_threshold {
            return Err(FaceIdError::InvalidConfig(format!(
                "coarse_threshold {} must not be below match_threshold {}",
                self.coarse_threshold, self.match_threshold
            )));
        }
        if self.batch_local_threshold > self.batch_persisted_threshold {
            return Err(FaceIdError::InvalidConfig(format!(
                "batch_local_threshold {} must not exceed batch_persisted_threshold {}",
                self.batch_local_threshold, self.batch_persisted_threshold
            )));
        }
        if !(self.high_confidence_below < self.medium_confidence_below
            && self.medium_confidence_below < self.match_threshold)
        {
            return Err(FaceIdError::InvalidConfig(format!(
                "confidence bands must satisfy high {} < medium {} < match {}",
                self.high_confidence_below, self.medium_confidence_below, self.match_threshold
            )));
        }
        Ok(())
    }

    /// Bound applied to each collaborator call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

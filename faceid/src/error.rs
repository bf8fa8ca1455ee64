use std::time::Duration;

use thiserror::Error;

/// Errors returned by faceid operations.
///
/// Malformed vectors (wrong dimension, empty) are not errors: the distance
/// function maps them to the maximum distance so they never match.
#[derive(Error, Debug)]
pub enum FaceIdError {
    #[error("faceid: store error: {0}")]
    Store(String),

    #[error("faceid: {op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("faceid: detector error: {0}")]
    Detector(String),

    #[error("faceid: no detector configured")]
    NoDetector,

    #[error("faceid: invalid id: {0}")]
    InvalidId(String),

    #[error("faceid: invalid config: {0}")]
    InvalidConfig(String),

    #[error("faceid: serialization error: {0}")]
    Serialization(String),
}

/// Result type for faceid operations.
pub type FaceIdResult<T> = Result<T, FaceIdError>;

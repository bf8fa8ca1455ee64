use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FaceIdResult;

/// One face found in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Descriptor produced by the recognition model.
    pub vector: Vec<f32>,
    /// Reference to the face crop, if the detector stored one.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Detector finds faces in an encoded image and extracts their descriptors.
///
/// Implementations must be safe for concurrent use (Send + Sync). Failures
/// should be reported as [`crate::FaceIdError::Detector`].
#[async_trait]
pub trait Detector: Send + Sync {
    /// Returns zero or more faces.
    async fn detect(&self, image: &[u8]) -> FaceIdResult<Vec<DetectedFace>>;
}

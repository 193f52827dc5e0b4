use anyhow::Error;
use image::RgbImage;

use crate::utils::coordinate::FaceBox;

pub mod face_detection_client;
pub mod face_embedding_client;
pub mod reference_fetch_client;

/// FaceDetector locates faces in an image.
///
/// Implementations must be safe for concurrent read-only inference; the ONNX
/// clients serialize their sessions internally.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, img: &RgbImage) -> Result<Vec<FaceBox>, Error>;
}

/// FaceEmbedder turns a cropped face into a raw (un-normalized) identity vector.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, face: &RgbImage) -> Result<Vec<f32>, Error>;
}

use std::path::PathBuf;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

/// Reference fetch timeouts below this floor are raised to it.
pub const MIN_FETCH_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceDetectionConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub mean: f32,
    pub scale: f32,
}

impl FaceDetectionConfig {
    pub fn new(model_path: PathBuf) -> Self {
        FaceDetectionConfig {
            model_path,
            input_size: 640,
            score_threshold: 0.5,
            iou_threshold: 0.4,
            mean: 0.0,
            scale: 1.0 / 255.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceEmbeddingConfig {
    pub model_path: PathBuf,
    /// Pretrain identity of the embedding weights, reported in the model version.
    pub model_name: String,
    pub mean: f32,
    pub scale: f32,
    pub imsize: (u32, u32),
}

impl FaceEmbeddingConfig {
    pub fn new(model_path: PathBuf) -> Self {
        FaceEmbeddingConfig {
            model_path,
            model_name: "w600k_r50".to_string(),
            mean: 127.5,
            scale: 1.0 / 127.5,
            imsize: (112, 112),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub max_redirects: usize,
    pub max_response_bytes: usize,
}

impl FetchConfig {
    pub fn new(timeout_ms: u64) -> Self {
        FetchConfig {
            timeout_ms: timeout_ms.max(MIN_FETCH_TIMEOUT_MS),
            max_redirects: 5,
            max_response_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig::new(8000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub detection: FaceDetectionConfig,
    pub embedding: FaceEmbeddingConfig,
    pub fetch: FetchConfig,
}

impl ServiceConfig {
    pub fn new(detection_model: PathBuf, embedding_model: PathBuf) -> Self {
        ServiceConfig {
            detection: FaceDetectionConfig::new(detection_model),
            embedding: FaceEmbeddingConfig::new(embedding_model),
            fetch: FetchConfig::default(),
        }
    }

    /// from_env builds the config from process environment variables.
    ///
    /// `FACE_VERIFY_DETECTION_MODEL` and `FACE_VERIFY_EMBEDDING_MODEL` point at
    /// the ONNX files, `FACE_VERIFY_MODEL_NAME` names the embedding pretrain
    /// and `FACE_VERIFY_TIMEOUT_MS` bounds the reference fetch. A timeout that
    /// does not parse fails startup rather than silently falling back to the
    /// default.
    pub fn from_env() -> Result<Self, Error> {
        let detection_model = std::env::var("FACE_VERIFY_DETECTION_MODEL")
            .unwrap_or_else(|_| "models/yolov8n-face.onnx".to_string());
        let embedding_model = std::env::var("FACE_VERIFY_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "models/w600k_r50.onnx".to_string());

        let mut config = ServiceConfig::new(detection_model.into(), embedding_model.into());

        if let Ok(model_name) = std::env::var("FACE_VERIFY_MODEL_NAME") {
            config.embedding.model_name = model_name;
        }
        if let Ok(raw_timeout) = std::env::var("FACE_VERIFY_TIMEOUT_MS") {
            let timeout_ms: u64 = raw_timeout.parse().with_context(|| {
                format!("config - invalid FACE_VERIFY_TIMEOUT_MS value {raw_timeout:?}")
            })?;
            config.fetch = FetchConfig::new(timeout_ms);
        }

        Ok(config)
    }
}

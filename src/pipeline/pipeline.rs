use anyhow::Error;
use image::RgbImage;
use tracing::{debug, error, info};

use crate::config::config::ServiceConfig;
use crate::modules::face_detection_client::FaceDetectionClient;
use crate::modules::face_embedding_client::FaceEmbeddingClient;
use crate::modules::reference_fetch_client::ReferenceFetchClient;
use crate::modules::{FaceDetector, FaceEmbedder};
use crate::pipeline::contract::{
    ImageRole, ReasonCode, ServiceIdentity, VerificationRequest, VerificationResult,
    EXECUTION_MODE, PROVIDER_NAME, SERVICE_NAME,
};
use crate::utils::image::{crop_face, decode_image_bytes, decode_selfie_data_url};
use crate::utils::utils::mask_url;

/// Outcome of the single-face embedding step: either a unit-norm embedding or
/// a typed rejection the orchestrator returns as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceExtraction {
    Embedding(Vec<f32>),
    Rejected(ReasonCode),
}

/// similarity_score computes the cosine similarity of two unit-norm vectors.
///
/// The dot product is accumulated in f64 and clamped into [0, 1]; non-finite
/// values collapse to 0.0 so the wire contract stays bounded.
///
/// # Arguments
/// * `a` - &[f32]
/// * `b` - &[f32]
///
/// # Returns
/// * `f64`
pub fn similarity_score(a: &[f32], b: &[f32]) -> f64 {
    let dot_product: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(a, b)| (*a as f64) * (*b as f64))
        .sum();
    if !dot_product.is_finite() {
        return 0.0;
    }
    dot_product.clamp(0.0, 1.0)
}

#[derive(Debug)]
pub struct VerificationPipeline<D, E> {
    detector: D,
    embedder: E,
    fetcher: ReferenceFetchClient,
    model_version: String,
}

impl VerificationPipeline<FaceDetectionClient, FaceEmbeddingClient> {
    /// from_config builds the production pipeline, loading both ONNX models
    /// once. The result is meant to live for the whole process and be shared
    /// read-only across calls.
    ///
    /// # Arguments
    /// * `config` - ServiceConfig
    ///
    /// # Returns
    /// * `Result<VerificationPipeline<FaceDetectionClient, FaceEmbeddingClient>, Error>`
    pub fn from_config(config: ServiceConfig) -> Result<Self, Error> {
        let model_version = format!(
            "arcface-yolov8face-{}-{}",
            config.embedding.model_name, EXECUTION_MODE
        );
        let detector = FaceDetectionClient::new(config.detection)?;
        let embedder = FaceEmbeddingClient::new(config.embedding)?;
        let fetcher = ReferenceFetchClient::new(config.fetch)?;
        Ok(VerificationPipeline::new(detector, embedder, fetcher, model_version))
    }
}

impl<D: FaceDetector, E: FaceEmbedder> VerificationPipeline<D, E> {
    /// new initializes the pipeline from already-constructed collaborators.
    ///
    /// # Arguments
    /// * `detector` - D
    /// * `embedder` - E
    /// * `fetcher` - ReferenceFetchClient
    /// * `model_version` - String
    ///
    /// # Returns
    /// * `VerificationPipeline<D, E>`
    pub fn new(detector: D, embedder: E, fetcher: ReferenceFetchClient, model_version: String) -> Self {
        VerificationPipeline {
            detector,
            embedder,
            fetcher,
            model_version,
        }
    }

    /// identity reports the provider and model constants for health checks.
    ///
    /// # Returns
    /// * `ServiceIdentity`
    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity {
            ok: true,
            service: SERVICE_NAME.to_string(),
            model: self.model_version.clone(),
            mode: EXECUTION_MODE.to_string(),
        }
    }

    /// verify runs one verification call to completion.
    ///
    /// Every expected failure (bad image, fetch failure, face-count policy,
    /// low score) comes back as an `Ok` result carrying a reason code; an
    /// `Err` is an internal fault and is logged with the request id before it
    /// propagates to the boundary layer.
    ///
    /// # Arguments
    /// * `request` - the validated verification request
    ///
    /// # Returns
    /// * `Result<VerificationResult, Error>`
    pub async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResult, Error> {
        debug!(
            request_id = %request.request_id,
            reference_url = %mask_url(&request.reference_url),
            threshold = request.threshold,
            "verification requested"
        );
        match self.verify_inner(request).await {
            Ok(result) => {
                info!(
                    request_id = %request.request_id,
                    approved = result.approved,
                    score = result.face_match_score,
                    reason = result.reason_code.map(|code| code.as_str()).unwrap_or("-"),
                    model = %result.model_version,
                    "verification completed"
                );
                Ok(result)
            }
            Err(err) => {
                error!(
                    request_id = %request.request_id,
                    "verification failed unexpectedly: {err:#}"
                );
                Err(err)
            }
        }
    }

    async fn verify_inner(&self, request: &VerificationRequest) -> Result<VerificationResult, Error> {
        let selfie = match decode_selfie_data_url(&request.selfie_data_url) {
            Ok(img) => img,
            Err(err) => {
                debug!(request_id = %request.request_id, "selfie decode rejected: {err:#}");
                return Ok(self.rejection(request, ReasonCode::BadImage));
            }
        };

        let reference_bytes = match self.fetcher.fetch(&request.reference_url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                info!(
                    request_id = %request.request_id,
                    reference_url = %mask_url(&request.reference_url),
                    "reference fetch rejected: {err:#}"
                );
                return Ok(self.rejection(request, ReasonCode::ReferenceFetchFailed));
            }
        };
        let reference = match decode_image_bytes(&reference_bytes) {
            Ok(img) => img,
            Err(err) => {
                debug!(request_id = %request.request_id, "reference decode rejected: {err:#}");
                return Ok(self.rejection(request, ReasonCode::BadImage));
            }
        };

        let selfie_embedding = match self.extract_single_face_embedding(&selfie, ImageRole::Selfie)? {
            FaceExtraction::Embedding(vector) => vector,
            FaceExtraction::Rejected(reason) => return Ok(self.rejection(request, reason)),
        };
        let reference_embedding =
            match self.extract_single_face_embedding(&reference, ImageRole::Reference)? {
                FaceExtraction::Embedding(vector) => vector,
                FaceExtraction::Rejected(reason) => return Ok(self.rejection(request, reason)),
            };

        let score = similarity_score(&selfie_embedding, &reference_embedding);
        let approved = score >= request.threshold;

        Ok(VerificationResult {
            ok: true,
            provider: PROVIDER_NAME.to_string(),
            provider_request_id: request.request_id.clone(),
            liveness_passed: true,
            face_match_score: score,
            approved,
            reason_code: if approved { None } else { Some(ReasonCode::LowScore) },
            model_version: self.model_version.clone(),
        })
    }

    /// extract_single_face_embedding enforces the exactly-one-face policy.
    ///
    /// Ambiguous inputs are always rejected, never resolved by picking the
    /// largest or most central face. A detector-internal failure maps to
    /// `BAD_IMAGE`; an embedder failure is an internal fault and propagates.
    ///
    /// # Arguments
    /// * `img` - &RgbImage
    /// * `role` - ImageRole
    ///
    /// # Returns
    /// * `Result<FaceExtraction, Error>`
    pub fn extract_single_face_embedding(
        &self,
        img: &RgbImage,
        role: ImageRole,
    ) -> Result<FaceExtraction, Error> {
        let faces = match self.detector.detect(img) {
            Ok(faces) => faces,
            Err(err) => {
                error!(role = role.as_str(), "face detection failed: {err:#}");
                return Ok(FaceExtraction::Rejected(ReasonCode::BadImage));
            }
        };

        match faces.len() {
            0 => return Ok(FaceExtraction::Rejected(role.no_face())),
            1 => {}
            _ => return Ok(FaceExtraction::Rejected(role.multi_face())),
        }

        let face_crop = crop_face(img, &faces[0]);
        let raw_vector = self.embedder.embed(&face_crop)?;

        let norm = raw_vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Ok(FaceExtraction::Rejected(ReasonCode::BadImage));
        }
        Ok(FaceExtraction::Embedding(
            raw_vector.iter().map(|v| v / norm).collect(),
        ))
    }

    fn rejection(&self, request: &VerificationRequest, reason: ReasonCode) -> VerificationResult {
        VerificationResult {
            ok: true,
            provider: PROVIDER_NAME.to_string(),
            provider_request_id: request.request_id.clone(),
            liveness_passed: false,
            face_match_score: 0.0,
            approved: false,
            reason_code: Some(reason),
            model_version: self.model_version.clone(),
        }
    }
}

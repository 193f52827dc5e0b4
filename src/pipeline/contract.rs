use std::fmt;

use serde::{Deserialize, Serialize};

pub const PROVIDER_NAME: &str = "face-local-arcface";
pub const SERVICE_NAME: &str = "face-verify";
pub const EXECUTION_MODE: &str = "cpu";

/// One verification call, constructed once by the boundary layer.
///
/// `subject_id` is an opaque correlation key kept for the caller's
/// observability; it takes no part in the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub subject_id: String,
    pub reference_url: String,
    pub selfie_data_url: String,
    pub threshold: f64,
    pub request_id: String,
}

/// Stable machine-readable reasons for every non-approved outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    BadImage,
    ReferenceFetchFailed,
    NoFaceSelfie,
    NoFaceReference,
    MultiFaceSelfie,
    MultiFaceReference,
    LowScore,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::BadImage => "BAD_IMAGE",
            ReasonCode::ReferenceFetchFailed => "REFERENCE_FETCH_FAILED",
            ReasonCode::NoFaceSelfie => "NO_FACE_SELFIE",
            ReasonCode::NoFaceReference => "NO_FACE_REFERENCE",
            ReasonCode::MultiFaceSelfie => "MULTI_FACE_SELFIE",
            ReasonCode::MultiFaceReference => "MULTI_FACE_REFERENCE",
            ReasonCode::LowScore => "LOW_SCORE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which input an image came from; selects the reason-code variant only, the
/// extraction logic is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Selfie,
    Reference,
}

impl ImageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRole::Selfie => "selfie",
            ImageRole::Reference => "reference",
        }
    }

    pub(crate) fn no_face(self) -> ReasonCode {
        match self {
            ImageRole::Selfie => ReasonCode::NoFaceSelfie,
            ImageRole::Reference => ReasonCode::NoFaceReference,
        }
    }

    pub(crate) fn multi_face(self) -> ReasonCode {
        match self {
            ImageRole::Selfie => ReasonCode::MultiFaceSelfie,
            ImageRole::Reference => ReasonCode::MultiFaceReference,
        }
    }
}

/// The sole output shape for both approved and rejected verifications.
///
/// `ok` means the call was processed; a rejected subject is still `ok=true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub ok: bool,
    pub provider: String,
    pub provider_request_id: String,
    pub liveness_passed: bool,
    pub face_match_score: f64,
    pub approved: bool,
    pub reason_code: Option<ReasonCode>,
    pub model_version: String,
}

/// Health/identity descriptor for operational checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub ok: bool,
    pub service: String,
    pub model: String,
    pub mode: String,
}

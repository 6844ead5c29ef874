//! The `admission.k8s.io` review envelope.

use k8s_openapi::api::authentication::v1::UserInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_VERSION_V1: &str = "admission.k8s.io/v1";
pub const API_VERSION_V1BETA1: &str = "admission.k8s.io/v1beta1";
pub const KIND: &str = "AdmissionReview";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    pub kind: GroupVersionKind,

    #[serde(default)]
    pub resource: GroupVersionResource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_kind: Option<GroupVersionKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource: Option<GroupVersionResource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub operation: Operation,

    #[serde(default)]
    pub user_info: UserInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_object: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    pub allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode admission review: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported admission review {api_version}, Kind={kind}")]
    Unsupported { api_version: String, kind: String },

    #[error("admission review missing 'request'")]
    MissingRequest,
}

#[derive(Debug, Error)]
#[error("could not encode response: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Decodes an inbound review, returning its request and the API version the
/// response must echo.
pub fn decode(bytes: &[u8]) -> Result<(String, AdmissionRequest), DecodeError> {
    let review = serde_json::from_slice::<AdmissionReview>(bytes)?;
    if review.kind != KIND
        || (review.api_version != API_VERSION_V1 && review.api_version != API_VERSION_V1BETA1)
    {
        return Err(DecodeError::Unsupported {
            api_version: review.api_version,
            kind: review.kind,
        });
    }

    let request = review.request.ok_or(DecodeError::MissingRequest)?;
    Ok((review.api_version, request))
}

pub fn encode(review: &AdmissionReview) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(review).map_err(Into::into)
}

// === impl AdmissionResponse ===

impl AdmissionResponse {
    pub fn from_verdict(verdict: crate::core::Verdict) -> Self {
        Self {
            uid: None,
            allowed: verdict.allowed,
            status: verdict.reason.map(|reason| Status {
                message: None,
                reason: Some(reason),
            }),
        }
    }

    /// A denial that reports why the request could not be evaluated.
    pub fn invalid(error: impl std::fmt::Display) -> Self {
        Self {
            uid: None,
            allowed: false,
            status: Some(Status {
                message: Some(error.to_string()),
                reason: None,
            }),
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn into_review(self, api_version: impl Into<String>) -> AdmissionReview {
        AdmissionReview {
            api_version: api_version.into(),
            kind: KIND.to_string(),
            request: None,
            response: Some(self),
        }
    }
}

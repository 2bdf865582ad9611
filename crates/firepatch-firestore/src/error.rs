//! Firestore error types.

use firepatch_engine::PatchError;
use serde::Deserialize;
use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Delay used for 429 responses that carry no retry hint.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// Sign-in or refresh failed. The user must sign in again.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The document changed between read and write.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Size or index limit reported by the service, message kept verbatim.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(#[from] PatchError),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Google API error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl ErrorResponse {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Classify a non-success response by HTTP status and the `status`
    /// member of the error envelope, or its `code` when `status` is absent.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let detail = ErrorResponse::parse(&body).error;
        let message = detail.message.clone().unwrap_or_else(|| body.clone());
        // Without a canonical status name, the envelope's code decides.
        let status = match (&detail.status, detail.code) {
            (None, Some(code)) => code,
            _ => status,
        };

        match (status, detail.status.as_deref()) {
            (_, Some("FAILED_PRECONDITION")) | (412, _) => Self::Conflict(message),
            (_, Some("RESOURCE_EXHAUSTED")) => Self::QuotaExceeded(message),
            (_, Some("INVALID_ARGUMENT")) if is_size_limit(&message) => Self::QuotaExceeded(message),
            (_, Some("ALREADY_EXISTS")) | (409, _) => Self::AlreadyExists(message),
            (_, Some("NOT_FOUND")) | (404, _) => Self::NotFound(message),
            (_, Some("UNAUTHENTICATED")) | (401, _) => Self::Authentication(message),
            (_, Some("PERMISSION_DENIED")) | (403, _) => Self::PermissionDenied(message),
            (429, _) => Self::RateLimited(DEFAULT_RETRY_AFTER_MS),
            (500..=599, _) => Self::ServerError(status, message),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, message)),
        }
    }

    /// HTTP status this error corresponds to, for metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FirestoreError::Authentication(_) => Some(401),
            FirestoreError::PermissionDenied(_) => Some(403),
            FirestoreError::NotFound(_) => Some(404),
            FirestoreError::AlreadyExists(_) => Some(409),
            FirestoreError::Conflict(_) => Some(412),
            FirestoreError::RateLimited(_) | FirestoreError::QuotaExceeded(_) => Some(429),
            FirestoreError::ServerError(status, _) => Some(*status),
            FirestoreError::RequestFailed(_) => Some(400),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_) | FirestoreError::RateLimited(_) | FirestoreError::ServerError(_, _)
        )
    }

    /// True if the write precondition failed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FirestoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FirestoreError::NotFound(_))
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            FirestoreError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }
}

fn is_size_limit(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("maximum") || message.contains("index entries") || message.contains("too big")
}

//! Client configuration.

use std::time::Duration;

use firepatch_engine::MaskPolicy;

use crate::error::{FirestoreError, FirestoreResult};
use crate::retry::RetryConfig;

pub const DEFAULT_DATABASE_ID: &str = "(default)";
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Firebase / GCP project ID
    pub project_id: String,
    /// Web API key used for identity endpoints
    pub api_key: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Firestore REST root, including the API version
    pub firestore_url: String,
    /// Identity toolkit root (sign-in, sign-up, delete)
    pub identity_url: String,
    /// Secure token root (refresh)
    pub secure_token_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration for reads
    pub retry: RetryConfig,
    /// Which root keys an update writes back
    pub mask_policy: MaskPolicy,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: api_key.into(),
            database_id: DEFAULT_DATABASE_ID.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            secure_token_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(6),
            retry: RetryConfig::default(),
            mask_policy: MaskPolicy::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::Config(
                    "FIREBASE_PROJECT_ID or GCP_PROJECT_ID must be set to access Firestore".into(),
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::Config(
                "FIREBASE_PROJECT_ID or GCP_PROJECT_ID cannot be empty".into(),
            ));
        }

        let api_key = std::env::var("FIREBASE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| FirestoreError::Config("FIREBASE_API_KEY must be set".into()))?;

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6);

        let mask_policy = match std::env::var("FIRESTORE_MASK_POLICY") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| FirestoreError::Config(format!("FIRESTORE_MASK_POLICY: {}", e)))?,
            Err(_) => MaskPolicy::default(),
        };

        Ok(Self {
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| DEFAULT_DATABASE_ID.to_string()),
            firestore_url: std::env::var("FIRESTORE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_FIRESTORE_URL.to_string()),
            identity_url: std::env::var("FIREBASE_IDENTITY_URL")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_URL.to_string()),
            secure_token_url: std::env::var("FIREBASE_SECURE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_SECURE_TOKEN_URL.to_string()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            mask_policy,
            ..Self::new(project_id, api_key)
        })
    }

    /// Point every endpoint at one server, e.g. a local mock.
    ///
    /// Firestore is served from `{uri}/v1`, identity from
    /// `{uri}/identity/v1` and token refresh from `{uri}/securetoken/v1`.
    pub fn with_base_url(mut self, uri: &str) -> Self {
        let uri = uri.trim_end_matches('/');
        self.firestore_url = format!("{}/v1", uri);
        self.identity_url = format!("{}/identity/v1", uri);
        self.secure_token_url = format!("{}/securetoken/v1", uri);
        self
    }

    pub fn with_mask_policy(mut self, policy: MaskPolicy) -> Self {
        self.mask_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resource name of the database's document root.
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    /// REST URL of the document root.
    pub fn documents_url(&self) -> String {
        format!("{}/{}", self.firestore_url, self.documents_root())
    }
}

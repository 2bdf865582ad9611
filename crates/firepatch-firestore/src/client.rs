//! Firestore REST API client.
//!
//! HTTP implementation of [`DocumentTransport`] with:
//! - Bearer credentials from a shared [`CredentialManager`]
//! - One replay after an expired-credential 401
//! - Retry with backoff for reads
//! - Observability (tracing spans, metrics)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use firepatch_engine::MaskPolicy;
use firepatch_models::{DocumentKey, VersionToken};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::auth::CredentialManager;
use crate::config::FirestoreConfig;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::with_retry;
use crate::transport::DocumentTransport;
use crate::types::{Document, WireValue};

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    auth: Arc<CredentialManager>,
}

impl FirestoreClient {
    /// Create a client with its own, signed-out credential manager.
    pub fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let http = Self::build_http(&config)?;
        let auth = Arc::new(CredentialManager::new(http.clone(), &config));
        Ok(Self { http, config, auth })
    }

    /// Create a client sharing an existing credential manager.
    pub fn with_credentials(config: FirestoreConfig, auth: Arc<CredentialManager>) -> FirestoreResult<Self> {
        let http = Self::build_http(&config)?;
        Ok(Self { http, config, auth })
    }

    /// Create from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?)
    }

    fn build_http(config: &FirestoreConfig) -> FirestoreResult<Client> {
        Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("firepatch-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)
    }

    pub fn auth(&self) -> &Arc<CredentialManager> {
        &self.auth
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, key: &DocumentKey) -> String {
        format!("{}/{}", self.config.documents_url(), key.path())
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send with a bearer credential. A 401 for an expired credential
    /// refreshes it and replays the request once.
    async fn send_authorized<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let credential = self.auth.current_credential().await?;
        let response = build(credential.id_token()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(StatusCode::UNAUTHORIZED.as_u16(), body));
        }

        debug!("Credential rejected as expired, refreshing and replaying");
        self.auth.invalidate().await;
        let credential = self.auth.current_credential().await?;
        Ok(build(credential.id_token()).send().await?)
    }

    async fn fetch_once(&self, url: &str) -> FirestoreResult<Option<Document>> {
        let response = self.send_authorized(|token| self.http.get(url).bearer_auth(token)).await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::handle_error_response(status, response).await),
        }
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        key: &DocumentKey,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %key.collection,
            doc_id = %key.document
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), body)
    }
}

#[async_trait]
impl DocumentTransport for FirestoreClient {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(key);

        self.execute_request(
            "get_document",
            key,
            with_retry(&self.config.retry, "get_document", FirestoreError::is_retryable, || {
                self.fetch_once(&url)
            }),
        )
        .await
    }

    async fn create_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
    ) -> FirestoreResult<Document> {
        let url = format!("{}/{}", self.config.documents_url(), key.collection);
        let body = Document::new(fields);

        self.execute_request("create_document", key, async {
            let response = self
                .send_authorized(|token| {
                    self.http
                        .post(&url)
                        .query(&[("documentId", key.document.as_str())])
                        .bearer_auth(token)
                        .json(&body)
                })
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(key.to_string())),
                status => Err(Self::handle_error_response(status, response).await),
            }
        })
        .await
    }

    async fn patch_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
        mask: &[String],
        precondition: &VersionToken,
    ) -> FirestoreResult<Document> {
        if mask.is_empty() {
            return Err(FirestoreError::request_failed(
                "refusing to patch without a field mask",
            ));
        }

        let mut params: Vec<String> = mask
            .iter()
            .map(|path| format!("updateMask.fieldPaths={}", urlencoding::encode(path)))
            .collect();
        params.push(format!(
            "currentDocument.updateTime={}",
            urlencoding::encode(precondition.as_str())
        ));
        let url = format!("{}?{}", self.document_url(key), params.join("&"));
        let body = Document::new(fields);

        self.execute_request("patch_document", key, async {
            let response = self
                .send_authorized(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(Self::handle_error_response(status, response).await),
            }
        })
        .await
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        let url = self.document_url(key);

        self.execute_request("delete_document", key, async {
            let response = self
                .send_authorized(|token| self.http.delete(&url).bearer_auth(token))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {} already deleted (idempotent)", key);
                    Ok(())
                }
                status => Err(Self::handle_error_response(status, response).await),
            }
        })
        .await
    }

    async fn signed_in_user(&self) -> FirestoreResult<String> {
        let credential = self.auth.current_credential().await?;
        Ok(credential.user_id().to_string())
    }

    fn mask_policy(&self) -> MaskPolicy {
        self.config.mask_policy
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DocumentRepository;
    use serial_test::serial;

    #[test]
    fn test_access_token_expired_detection() {
        assert!(FirestoreClient::is_access_token_expired(
            r#"{"error":{"code":401,"status":"UNAUTHENTICATED"}}"#
        ));
        assert!(FirestoreClient::is_access_token_expired("ACCESS_TOKEN_EXPIRED"));
        assert!(!FirestoreClient::is_access_token_expired(
            r#"{"error":{"code":401,"message":"missing credential"}}"#
        ));
    }

    #[test]
    fn test_document_url() {
        let config = FirestoreConfig::new("demo", "key").with_base_url("http://localhost:8080");
        let client = FirestoreClient::new(config).unwrap();
        let key = DocumentKey::new("users/u1/notes", "n1");
        assert_eq!(
            client.document_url(&key),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/users/u1/notes/n1"
        );
    }

    #[test]
    fn test_repository_uses_configured_mask_policy() {
        let config = FirestoreConfig::new("demo", "key").with_mask_policy(MaskPolicy::Diff);
        let repo = DocumentRepository::new(FirestoreClient::new(config).unwrap());
        assert_eq!(repo.mask_policy(), MaskPolicy::Diff);
    }

    #[test]
    #[serial]
    fn test_mask_policy_from_env_reaches_repository() {
        std::env::set_var("FIREBASE_PROJECT_ID", "demo");
        std::env::set_var("FIREBASE_API_KEY", "key");
        std::env::set_var("FIRESTORE_MASK_POLICY", "touched");

        let client = FirestoreClient::from_env().unwrap();
        let repo = DocumentRepository::new(client);

        std::env::remove_var("FIREBASE_PROJECT_ID");
        std::env::remove_var("FIREBASE_API_KEY");
        std::env::remove_var("FIRESTORE_MASK_POLICY");
        assert_eq!(repo.mask_policy(), MaskPolicy::TouchedKeys);
    }
}

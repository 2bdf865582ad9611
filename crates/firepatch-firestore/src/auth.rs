//! Credential lifecycle for end-user (email/password) authentication.
//!
//! Provides an injectable credential manager with:
//! - Sign-in, sign-up and sign-in by refresh token
//! - Expiry tracking with a refresh margin
//! - Single-flight refresh so concurrent callers never race one refresh token
//! - Fallback to the current credential while it is still usable

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::FirestoreConfig;
use crate::error::{ErrorResponse, FirestoreError, FirestoreResult};
use crate::metrics::record_auth;

// =============================================================================
// Constants
// =============================================================================

/// Credentials are refreshed this long before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the service omits `expiresIn`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// =============================================================================
// Types
// =============================================================================

/// Observable state of a [`CredentialManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Authenticating,
    SignedIn,
    /// Signed in, but the credential is past its refresh margin.
    Expired,
    Refreshing,
}

/// A bearer credential together with the identity it belongs to.
#[derive(Clone)]
pub struct Credential {
    id_token: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Account id, used as the private-document name.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Valid with the refresh margin applied.
    fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }

    /// Still accepted by the service, even if a refresh is due.
    fn is_usable(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug)]
struct Session {
    state: AuthState,
    credential: Option<Credential>,
    refresh_token: Option<String>,
}

impl Session {
    fn signed_out() -> Self {
        Self {
            state: AuthState::SignedOut,
            credential: None,
            refresh_token: None,
        }
    }
}

/// `expiresIn` arrives as a decimal string, occasionally as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(i64),
    Text(String),
}

impl Seconds {
    fn as_secs(&self) -> i64 {
        match self {
            Seconds::Number(n) => *n,
            Seconds::Text(s) => s.trim().parse().unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        }
    }
}

/// Sign-in (camelCase) and refresh (snake_case) responses share this shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "idToken")]
    id_token: String,
    #[serde(alias = "refreshToken")]
    refresh_token: String,
    #[serde(alias = "expiresIn", default)]
    expires_in: Option<Seconds>,
    #[serde(alias = "localId")]
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAccountRequest<'a> {
    id_token: &'a str,
}

/// Why an exchange with the identity service failed.
enum ExchangeError {
    /// The service answered and said no.
    Rejected(String),
    /// No usable answer.
    Transport(String),
}

impl ExchangeError {
    fn message(&self) -> &str {
        match self {
            ExchangeError::Rejected(m) | ExchangeError::Transport(m) => m,
        }
    }
}

// =============================================================================
// Credential Manager
// =============================================================================

/// Owns the sign-in session and hands out current bearer credentials.
pub struct CredentialManager {
    http: Client,
    api_key: String,
    identity_url: String,
    secure_token_url: String,
    session: RwLock<Session>,
    /// Serializes every state transition that talks to the identity service.
    transition: Mutex<()>,
}

impl CredentialManager {
    pub fn new(http: Client, config: &FirestoreConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            identity_url: config.identity_url.trim_end_matches('/').to_string(),
            secure_token_url: config.secure_token_url.trim_end_matches('/').to_string(),
            session: RwLock::new(Session::signed_out()),
            transition: Mutex::new(()),
        }
    }

    /// Current state. A signed-in session whose credential is inside the
    /// refresh margin reports `Expired`.
    pub async fn state(&self) -> AuthState {
        let session = self.session.read().await;
        match (&session.state, &session.credential) {
            (AuthState::SignedIn, Some(credential)) if !credential.is_valid() => AuthState::Expired,
            (state, _) => *state,
        }
    }

    /// Identity of the signed-in account, if any.
    pub async fn user_id(&self) -> Option<String> {
        let session = self.session.read().await;
        session.credential.as_ref().map(|c| c.user_id.clone())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> FirestoreResult<Credential> {
        let url = format!("{}/accounts:signInWithPassword", self.identity_url);
        self.password_exchange(&url, email, password).await
    }

    /// Create an account and sign in to it.
    pub async fn sign_up_with_password(&self, email: &str, password: &str) -> FirestoreResult<Credential> {
        let url = format!("{}/accounts:signUp", self.identity_url);
        self.password_exchange(&url, email, password).await
    }

    /// Sign in with a previously issued refresh token.
    pub async fn sign_in_with_token(&self, refresh_token: &str) -> FirestoreResult<Credential> {
        let _guard = self.transition.lock().await;
        self.set_state(AuthState::Authenticating).await;

        let result = self.refresh_exchange(refresh_token).await;
        self.finish_sign_in(result).await
    }

    /// Return a credential that is valid for at least the refresh margin,
    /// refreshing it first if needed.
    pub async fn current_credential(&self) -> FirestoreResult<Credential> {
        if let Some(credential) = self.valid_credential().await {
            return Ok(credential);
        }

        let _guard = self.transition.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(credential) = self.valid_credential().await {
            return Ok(credential);
        }

        let (refresh_token, current) = {
            let session = self.session.read().await;
            (session.refresh_token.clone(), session.credential.clone())
        };
        let Some(refresh_token) = refresh_token else {
            return Err(FirestoreError::auth_error("not signed in"));
        };

        self.set_state(AuthState::Refreshing).await;
        debug!("Refreshing credential");

        match self.refresh_exchange(&refresh_token).await {
            Ok(response) => {
                let credential = self.store(response).await;
                record_auth("refreshed");
                debug!(user_id = %credential.user_id, "Credential refreshed");
                Ok(credential)
            }
            Err(e) => {
                if let Some(credential) = current.filter(Credential::is_usable) {
                    warn!("Credential refresh failed, using existing credential: {}", e.message());
                    self.set_state(AuthState::SignedIn).await;
                    record_auth("fallback");
                    return Ok(credential);
                }

                record_auth("failed");
                let mut session = self.session.write().await;
                match e {
                    ExchangeError::Rejected(_) => *session = Session::signed_out(),
                    ExchangeError::Transport(_) => session.state = AuthState::Expired,
                }
                warn!("Credential refresh failed: {}", e.message());
                Err(FirestoreError::auth_error(format!(
                    "refresh failed, sign in again: {}",
                    e.message()
                )))
            }
        }
    }

    /// Mark the current credential expired so the next call refreshes it.
    pub async fn invalidate(&self) {
        let mut session = self.session.write().await;
        if let Some(credential) = session.credential.as_mut() {
            credential.expires_at = Utc::now();
        }
        if session.state == AuthState::SignedIn {
            session.state = AuthState::Expired;
        }
    }

    /// Delete the signed-in account. The session ends on success.
    pub async fn delete_user(&self) -> FirestoreResult<()> {
        let credential = self.current_credential().await?;
        let _guard = self.transition.lock().await;

        let url = format!("{}/accounts:delete", self.identity_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&DeleteAccountRequest {
                id_token: credential.id_token(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FirestoreError::from_http_status(status.as_u16(), body));
        }

        *self.session.write().await = Session::signed_out();
        info!(user_id = %credential.user_id, "Deleted account");
        Ok(())
    }

    /// Forget the session locally.
    pub async fn sign_out(&self) {
        let _guard = self.transition.lock().await;
        *self.session.write().await = Session::signed_out();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn valid_credential(&self) -> Option<Credential> {
        let session = self.session.read().await;
        match (&session.state, &session.credential) {
            (AuthState::SignedIn, Some(credential)) if credential.is_valid() => Some(credential.clone()),
            _ => None,
        }
    }

    async fn set_state(&self, state: AuthState) {
        self.session.write().await.state = state;
    }

    async fn password_exchange(&self, url: &str, email: &str, password: &str) -> FirestoreResult<Credential> {
        let _guard = self.transition.lock().await;
        self.set_state(AuthState::Authenticating).await;

        let request = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            });
        let result = Self::exchange(request).await;
        self.finish_sign_in(result).await
    }

    async fn refresh_exchange(&self, refresh_token: &str) -> Result<TokenResponse, ExchangeError> {
        let request = self
            .http
            .post(format!("{}/token", self.secure_token_url))
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]);
        Self::exchange(request).await
    }

    async fn exchange(request: reqwest::RequestBuilder) -> Result<TokenResponse, ExchangeError> {
        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if status.is_server_error() {
            return Err(ExchangeError::Transport(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let message = ErrorResponse::parse(&body)
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ExchangeError::Rejected(message));
        }

        serde_json::from_str(&body)
            .map_err(|e| ExchangeError::Transport(format!("malformed token response: {}", e)))
    }

    async fn finish_sign_in(&self, result: Result<TokenResponse, ExchangeError>) -> FirestoreResult<Credential> {
        match result {
            Ok(response) => {
                let credential = self.store(response).await;
                record_auth("sign_in");
                info!(user_id = %credential.user_id, "Signed in");
                Ok(credential)
            }
            Err(e) => {
                *self.session.write().await = Session::signed_out();
                record_auth("failed");
                warn!("Sign-in failed: {}", e.message());
                Err(FirestoreError::auth_error(e.message().to_string()))
            }
        }
    }

    async fn store(&self, response: TokenResponse) -> Credential {
        let expires_in = response
            .expires_in
            .as_ref()
            .map(Seconds::as_secs)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let credential = Credential {
            id_token: response.id_token,
            user_id: response.user_id,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        };

        let mut session = self.session.write().await;
        session.state = AuthState::SignedIn;
        session.credential = Some(credential.clone());
        session.refresh_token = Some(response.refresh_token);
        credential
    }
}

// =============================================================================
// Tests
// =============================================================================

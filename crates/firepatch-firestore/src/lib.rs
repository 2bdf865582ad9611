//! Firestore REST client for firepatch.
//!
//! This crate provides:
//! - A codec between `firepatch_models::Value` and Firestore's tagged values
//! - Credential lifecycle management (sign-in, expiry, refresh-by-token)
//! - An HTTP transport with bearer auth, tracing and metrics
//! - `DocumentRepository`, which runs read-modify-write updates guarded by
//!   the document's `updateTime`, plus plain create/read/delete

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod retry;
pub mod transport;
pub mod types;

pub use auth::{AuthState, Credential, CredentialManager};
pub use client::FirestoreClient;
pub use config::FirestoreConfig;
pub use error::{FirestoreError, FirestoreResult};
pub use repository::DocumentRepository;
pub use retry::RetryConfig;
pub use transport::DocumentTransport;
pub use types::{Document, WireValue};

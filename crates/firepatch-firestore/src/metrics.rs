//! Firestore and auth metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";

    /// Updates rejected because the document changed, by collection.
    pub const CONFLICTS_TOTAL: &str = "firestore_conflicts_total";

    /// Sign-in and refresh attempts by outcome.
    pub const AUTH_REFRESH_TOTAL: &str = "auth_refresh_total";
}

/// Record metrics for a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_conflict(collection: &str) {
    counter!(
        names::CONFLICTS_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// `outcome` is one of `sign_in`, `refreshed`, `fallback`, `failed`.
pub fn record_auth(outcome: &'static str) {
    counter!(names::AUTH_REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

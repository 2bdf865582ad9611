//! Scalar types with a dedicated wire representation.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Geographic point. Positive latitude is north, positive longitude is east.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, clamping out-of-range coordinates to the poles and
    /// the antimeridian. Non-finite coordinates become 0.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: clamp_coordinate(latitude, 90.0),
            longitude: clamp_coordinate(longitude, 180.0),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

fn clamp_coordinate(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-limit, limit)
    }
}

/// Timestamp kept as the ISO-8601 UTC string it was created from.
///
/// The string is stored and sent verbatim; parsing happens only on request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub const DEFAULT: &'static str = "2000-01-01T00:00:00Z";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// RFC 3339 rendering with a `Z` suffix and as many fractional digits
    /// as the instant needs.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the stored string. Returns `None` if it is not RFC 3339.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

/// Fully qualified path of another document.
///
/// Format: `projects/{project}/databases/{database}/documents/{collection}/{id}`.
/// Existence of the target is asserted by the caller, never checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentReference(String);

impl DocumentReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn for_document(project_id: &str, database_id: &str, collection: &str, doc_id: &str) -> Self {
        Self(format!(
            "projects/{}/databases/{}/documents/{}/{}",
            project_id, database_id, collection, doc_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

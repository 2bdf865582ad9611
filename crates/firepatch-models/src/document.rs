//! Document addressing and versioning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Fields;

/// A (collection, document id) pair.
///
/// `collection` may itself be a nested path such as `users/u1/notes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub collection: String,
    pub document: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            document: document.into(),
        }
    }

    /// Key with missing names replaced by `user_id`.
    ///
    /// `resolve(None, None, "u1")` addresses the private document `u1/u1`.
    pub fn resolve(collection: Option<&str>, document: Option<&str>, user_id: &str) -> Self {
        Self::new(
            collection.unwrap_or(user_id),
            document.unwrap_or(user_id),
        )
    }

    /// Relative path below the database's `documents` root.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.document)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.document)
    }
}

/// Opaque last-modified marker assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document content together with the version it was read or written at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedDocument {
    pub fields: Fields,
    pub version: VersionToken,
}

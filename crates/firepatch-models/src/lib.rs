//! Document value model for firepatch.
//!
//! This crate provides the in-process representation of remote documents:
//! - `Value`, the closed set of field value variants
//! - Dedicated scalars: `GeoPoint`, `Timestamp`, `DocumentReference`
//! - Document addressing (`DocumentKey`) and optimistic-concurrency tokens

pub mod document;
pub mod scalar;
pub mod value;

pub use document::{DocumentKey, VersionToken, VersionedDocument};
pub use scalar::{DocumentReference, GeoPoint, Timestamp};
pub use value::{element_count, Fields, Value};

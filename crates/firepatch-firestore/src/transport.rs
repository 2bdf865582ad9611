//! Document transport seam.
//!
//! The repository talks to the database only through this trait.
//! [`FirestoreClient`](crate::FirestoreClient) implements it over HTTPS;
//! tests substitute an in-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use firepatch_engine::MaskPolicy;
use firepatch_models::{DocumentKey, VersionToken};

use crate::error::FirestoreResult;
use crate::types::{Document, WireValue};

#[async_trait]
pub trait DocumentTransport: Send + Sync {
    /// Fetch a document. `Ok(None)` if it does not exist.
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<Document>>;

    /// Create a document, failing with `AlreadyExists` if present.
    async fn create_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
    ) -> FirestoreResult<Document>;

    /// Write the masked fields, conditioned on the document still being at
    /// `precondition`. Mask entries absent from `fields` are deleted.
    ///
    /// Fails with `Conflict` if the document changed since `precondition`.
    async fn patch_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
        mask: &[String],
        precondition: &VersionToken,
    ) -> FirestoreResult<Document>;

    /// Delete a document. Deleting an absent document succeeds.
    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()>;

    /// Identity of the signed-in account, used for private documents.
    async fn signed_in_user(&self) -> FirestoreResult<String>;

    /// Mask policy a repository over this transport starts with.
    fn mask_policy(&self) -> MaskPolicy {
        MaskPolicy::default()
    }
}

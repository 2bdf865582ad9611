//! Document repository: read-modify-write updates and plain CRUD.

use firepatch_engine::{apply_with_policy, field_paths, MaskPolicy, PatchSpec};
use firepatch_models::{element_count, DocumentKey, Fields, VersionToken, VersionedDocument};
use tracing::{debug, info, warn};

use crate::codec::{decode_document, encode_fields, encode_subset};
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_conflict, record_retry};
use crate::retry::{calculate_delay, RetryConfig};
use crate::transport::DocumentTransport;
use crate::types::Document;

/// Repository over a [`DocumentTransport`].
///
/// Every operation takes optional collection and document names; a `None`
/// name is replaced by the signed-in user's id, so `(None, None)` addresses
/// that user's private document.
pub struct DocumentRepository<T> {
    transport: T,
    mask_policy: MaskPolicy,
}

impl<T: DocumentTransport> DocumentRepository<T> {
    /// Starts with the transport's configured mask policy.
    pub fn new(transport: T) -> Self {
        let mask_policy = transport.mask_policy();
        Self {
            transport,
            mask_policy,
        }
    }

    pub fn with_mask_policy(mut self, mask_policy: MaskPolicy) -> Self {
        self.mask_policy = mask_policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mask_policy(&self) -> MaskPolicy {
        self.mask_policy
    }

    /// Effective key for possibly-missing names.
    pub async fn resolve(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
    ) -> FirestoreResult<DocumentKey> {
        if let (Some(collection), Some(document)) = (collection, document) {
            return Ok(DocumentKey::new(collection, document));
        }
        let user_id = self.transport.signed_in_user().await?;
        Ok(DocumentKey::resolve(collection, document, &user_id))
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a document. Fails with `AlreadyExists` if it is present.
    pub async fn create(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
        fields: &Fields,
    ) -> FirestoreResult<VersionedDocument> {
        let key = self.resolve(collection, document).await?;
        let created = self
            .transport
            .create_document(&key, encode_fields(fields)?)
            .await?;
        info!("Created document {}", key);
        decode_document(created)
    }

    /// Read a document. Fails with `NotFound` if it is absent.
    pub async fn read(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
    ) -> FirestoreResult<VersionedDocument> {
        let key = self.resolve(collection, document).await?;
        self.fetch(&key).await
    }

    /// Delete a document. Deleting an absent document succeeds.
    pub async fn delete(&self, collection: Option<&str>, document: Option<&str>) -> FirestoreResult<()> {
        let key = self.resolve(collection, document).await?;
        self.transport.delete_document(&key).await?;
        info!("Deleted document {}", key);
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Read the document, apply `spec`, and write back the dirty root keys
    /// on condition that nobody wrote in between.
    ///
    /// Returns the merged fields and the new version. A concurrent write
    /// surfaces as `Conflict`; nothing is retried.
    pub async fn update(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
        spec: &mut PatchSpec,
    ) -> FirestoreResult<VersionedDocument> {
        spec.validate()?;
        let key = self.resolve(collection, document).await?;

        match self.update_once(&key, spec).await {
            Err(e) if e.is_conflict() => {
                record_conflict(&key.collection);
                warn!("Update of {} rejected, document changed since read", key);
                Err(e)
            }
            result => result,
        }
    }

    /// Like [`update`](Self::update), but re-runs the whole read-modify-write
    /// after a conflict, with backoff, up to `retry.max_retries` times.
    ///
    /// The transform, if any, runs again against the freshly read document
    /// on every attempt.
    pub async fn update_with_retry(
        &self,
        collection: Option<&str>,
        document: Option<&str>,
        spec: &mut PatchSpec,
        retry: &RetryConfig,
    ) -> FirestoreResult<VersionedDocument> {
        spec.validate()?;
        let key = self.resolve(collection, document).await?;

        let mut attempt = 0;
        loop {
            match self.update_once(&key, spec).await {
                Err(e) if e.is_conflict() => {
                    record_conflict(&key.collection);
                    if attempt >= retry.max_retries {
                        warn!(
                            "Update of {} still conflicting after {} retries",
                            key, retry.max_retries
                        );
                        return Err(e);
                    }

                    let delay = calculate_delay(retry, attempt, None);
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Update of {} conflicted, retrying",
                        key
                    );
                    record_retry("update");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn update_once(&self, key: &DocumentKey, spec: &mut PatchSpec) -> FirestoreResult<VersionedDocument> {
        let current = self.fetch(key).await?;
        let outcome = apply_with_policy(&current.fields, spec, self.mask_policy)?;

        if outcome.dirty.is_empty() {
            debug!("Patch for {} changed nothing, skipping write", key);
            return Ok(VersionedDocument {
                fields: outcome.fields,
                version: current.version,
            });
        }

        debug!(
            dirty = ?outcome.dirty,
            elements = element_count(&outcome.fields),
            "Writing patch for {}",
            key
        );

        let body = encode_subset(&outcome.fields, &outcome.dirty)?;
        let mask = field_paths(&outcome.dirty);
        let written = self
            .transport
            .patch_document(key, body, &mask, &current.version)
            .await?;

        Ok(VersionedDocument {
            fields: outcome.fields,
            version: version_of(written, key)?,
        })
    }

    async fn fetch(&self, key: &DocumentKey) -> FirestoreResult<VersionedDocument> {
        let doc = self
            .transport
            .get_document(key)
            .await?
            .ok_or_else(|| FirestoreError::not_found(key.to_string()))?;
        decode_document(doc)
    }
}

fn version_of(doc: Document, key: &DocumentKey) -> FirestoreResult<VersionToken> {
    doc.update_time
        .map(VersionToken::new)
        .ok_or_else(|| FirestoreError::invalid_response(format!("write to {} returned no updateTime", key)))
}

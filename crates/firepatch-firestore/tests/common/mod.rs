//! Shared test fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use firepatch_firestore::codec::{decode_fields, encode_fields};
use firepatch_firestore::{Document, DocumentTransport, FirestoreError, FirestoreResult, WireValue};
use firepatch_models::{DocumentKey, Fields, VersionToken};

/// Route `tracing` output to the test harness. `RUST_LOG` selects levels.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A patch call as seen by the transport.
#[derive(Debug, Clone)]
pub struct PatchCall {
    pub key: DocumentKey,
    pub mask: Vec<String>,
    pub fields: HashMap<String, WireValue>,
}

#[derive(Default)]
struct State {
    docs: HashMap<DocumentKey, (HashMap<String, WireValue>, VersionToken)>,
    clock: u64,
    user: Option<String>,
    patches: Vec<PatchCall>,
}

impl State {
    fn next_version(&mut self) -> VersionToken {
        self.clock += 1;
        VersionToken::new(format!("2024-01-01T00:00:00.{:06}Z", self.clock))
    }

    fn document(key: &DocumentKey, fields: &HashMap<String, WireValue>, version: &VersionToken) -> Document {
        Document {
            name: Some(format!("projects/test/databases/(default)/documents/{}", key.path())),
            fields: Some(fields.clone()),
            create_time: None,
            update_time: Some(version.as_str().to_string()),
        }
    }
}

/// In-memory document store with Firestore's masked-patch semantics.
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: &str) -> Self {
        let transport = Self::new();
        transport.state.lock().unwrap().user = Some(user.to_string());
        transport
    }

    pub fn insert(&self, key: &DocumentKey, fields: &Fields) -> VersionToken {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        state
            .docs
            .insert(key.clone(), (encode_fields(fields).unwrap(), version.clone()));
        version
    }

    pub fn fields(&self, key: &DocumentKey) -> Option<Fields> {
        let state = self.state.lock().unwrap();
        state
            .docs
            .get(key)
            .map(|(fields, _)| decode_fields(fields.clone()).unwrap())
    }

    pub fn version(&self, key: &DocumentKey) -> Option<VersionToken> {
        let state = self.state.lock().unwrap();
        state.docs.get(key).map(|(_, version)| version.clone())
    }

    /// Simulate another client writing the document.
    pub fn external_write(&self, key: &DocumentKey, field: &str, value: WireValue) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some((fields, current)) = state.docs.get_mut(key) {
            fields.insert(field.to_string(), value);
            *current = version;
        }
    }

    pub fn patches(&self) -> Vec<PatchCall> {
        self.state.lock().unwrap().patches.clone()
    }
}

fn unquote(path: &str) -> String {
    match path.strip_prefix('`').and_then(|p| p.strip_suffix('`')) {
        Some(inner) => inner.replace("\\`", "`").replace("\\\\", "\\"),
        None => path.to_string(),
    }
}

#[async_trait]
impl DocumentTransport for MemoryTransport {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<Option<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .docs
            .get(key)
            .map(|(fields, version)| State::document(key, fields, version)))
    }

    async fn create_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
    ) -> FirestoreResult<Document> {
        let mut state = self.state.lock().unwrap();
        if state.docs.contains_key(key) {
            return Err(FirestoreError::AlreadyExists(key.to_string()));
        }
        let version = state.next_version();
        let doc = State::document(key, &fields, &version);
        state.docs.insert(key.clone(), (fields, version));
        Ok(doc)
    }

    async fn patch_document(
        &self,
        key: &DocumentKey,
        fields: HashMap<String, WireValue>,
        mask: &[String],
        precondition: &VersionToken,
    ) -> FirestoreResult<Document> {
        let mut state = self.state.lock().unwrap();
        state.patches.push(PatchCall {
            key: key.clone(),
            mask: mask.to_vec(),
            fields: fields.clone(),
        });

        let version = state.next_version();
        let Some((stored, current)) = state.docs.get_mut(key) else {
            return Err(FirestoreError::Conflict(format!("{} does not exist", key)));
        };
        if current != precondition {
            return Err(FirestoreError::Conflict(format!(
                "{} is at {}, expected {}",
                key, current, precondition
            )));
        }

        for path in mask {
            let name = unquote(path);
            match fields.get(&name) {
                Some(value) => {
                    stored.insert(name, value.clone());
                }
                None => {
                    stored.remove(&name);
                }
            }
        }
        *current = version;
        Ok(State::document(key, stored, current))
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        self.state.lock().unwrap().docs.remove(key);
        Ok(())
    }

    async fn signed_in_user(&self) -> FirestoreResult<String> {
        self.state
            .lock()
            .unwrap()
            .user
            .clone()
            .ok_or_else(|| FirestoreError::auth_error("not signed in"))
    }
}

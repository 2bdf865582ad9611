//! HTTP behaviour of `FirestoreClient` against a mock server.

mod common;

use common::init_tracing;
use firepatch_engine::PatchSpec;
use firepatch_firestore::{
    DocumentRepository, FirestoreClient, FirestoreConfig, FirestoreError, RetryConfig,
};
use firepatch_models::{Fields, Value};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCS: &str = "/v1/projects/demo/databases/(default)/documents";
const VERSION_1: &str = "2024-01-01T00:00:00.000001Z";
const VERSION_2: &str = "2024-01-01T00:00:05.000002Z";

async fn signed_in_repo(server: &MockServer) -> DocumentRepository<FirestoreClient> {
    init_tracing();
    Mock::given(method("POST"))
        .and(path("/identity/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idToken": "token-1",
            "refreshToken": "refresh-1",
            "expiresIn": "3600",
            "localId": "user-1"
        })))
        .mount(server)
        .await;

    let config = FirestoreConfig::new("demo", "test-key")
        .with_base_url(&server.uri())
        .with_retry(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        });
    let client = FirestoreClient::new(config).unwrap();
    client
        .auth()
        .sign_in_with_password("a@b.c", "pw")
        .await
        .unwrap();
    DocumentRepository::new(client)
}

fn document(path_suffix: &str, fields: serde_json::Value, update_time: &str) -> serde_json::Value {
    json!({
        "name": format!("projects/demo/databases/(default)/documents/{}", path_suffix),
        "fields": fields,
        "createTime": VERSION_1,
        "updateTime": update_time
    })
}

fn error_body(code: u16, status: &str, message: &str) -> serde_json::Value {
    json!({"error": {"code": code, "status": status, "message": message}})
}

async fn mount_get(server: &MockServer, doc: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", DOCS, doc)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_update_sends_mask_and_precondition() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "docs/d1",
            json!({
                "count": {"integerValue": "41"},
                "tags": {"arrayValue": {"values": [{"stringValue": "x"}]}},
                "keep": {"booleanValue": true}
            }),
            VERSION_1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .and(query_param("updateMask.fieldPaths", "count"))
        .and(query_param("updateMask.fieldPaths", "tags"))
        .and(query_param("currentDocument.updateTime", VERSION_1))
        .and(body_partial_json(json!({
            "fields": {
                "count": {"integerValue": "42"},
                "tags": {"arrayValue": {"values": [{"stringValue": "x"}, {"stringValue": "y"}]}}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "docs/d1",
            json!({
                "count": {"integerValue": "42"},
                "tags": {"arrayValue": {"values": [{"stringValue": "x"}, {"stringValue": "y"}]}},
                "keep": {"booleanValue": true}
            }),
            VERSION_2,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut spec = PatchSpec::new()
        .replace(["count"], 42)
        .replace_elements(["tags"], [(1, "y")]);
    let result = repo.update(Some("docs"), Some("d1"), &mut spec).await.unwrap();

    assert_eq!(result.version.as_str(), VERSION_2);
    assert_eq!(result.fields["count"], Value::from(42));
    assert_eq!(result.fields["tags"], Value::array(["x", "y"]));
    assert_eq!(result.fields["keep"], Value::from(true));
}

#[tokio::test]
async fn test_failed_precondition_is_conflict() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;
    mount_get(&server, "docs/d1", document("docs/d1", json!({}), VERSION_1)).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(
            400,
            "FAILED_PRECONDITION",
            "the stored version does not match the required base version",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut spec = PatchSpec::new().replace(["a"], 1);
    let err = repo.update(Some("docs"), Some("d1"), &mut spec).await.unwrap_err();
    assert!(matches!(err, FirestoreError::Conflict(_)));
}

#[tokio::test]
async fn test_quota_error_is_surfaced_verbatim() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;
    mount_get(&server, "docs/big", document("docs/big", json!({}), VERSION_1)).await;

    let message = "Document 'docs/big' cannot be written because its size exceeds the maximum allowed size of 1,048,576 bytes.";
    Mock::given(method("PATCH"))
        .and(path(format!("{}/docs/big", DOCS)))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(400, "INVALID_ARGUMENT", message)))
        .mount(&server)
        .await;

    let mut spec = PatchSpec::new().replace(["blob"], vec![0u8; 16]);
    let err = repo.update(Some("docs"), Some("big"), &mut spec).await.unwrap_err();
    assert!(matches!(err, FirestoreError::QuotaExceeded(ref m) if m == message));
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/docs/none", DOCS)))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "NOT_FOUND", "no entity")))
        .mount(&server)
        .await;

    let mut spec = PatchSpec::new().replace(["a"], 1);
    let err = repo.update(Some("docs"), Some("none"), &mut spec).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_and_replayed() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(error_body(
            401,
            "UNAUTHENTICATED",
            "Request had invalid authentication credentials.",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/securetoken/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "token-2",
            "refresh_token": "refresh-2",
            "expires_in": "3600",
            "user_id": "user-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "docs/d1",
            json!({"a": {"stringValue": "fresh"}}),
            VERSION_1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let doc = repo.read(Some("docs"), Some("d1")).await.unwrap();
    assert_eq!(doc.fields["a"], Value::from("fresh"));
}

#[tokio::test]
async fn test_transient_read_failure_is_retried() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/docs/flaky", DOCS)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_get(&server, "docs/flaky", document("docs/flaky", json!({"ok": {"booleanValue": true}}), VERSION_1)).await;

    let doc = repo.read(Some("docs"), Some("flaky")).await.unwrap();
    assert_eq!(doc.fields["ok"], Value::from(true));
}

#[tokio::test]
async fn test_write_failures_are_not_retried() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;
    mount_get(&server, "docs/d1", document("docs/d1", json!({}), VERSION_1)).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/docs/d1", DOCS)))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let mut spec = PatchSpec::new().replace(["a"], 1);
    let err = repo.update(Some("docs"), Some("d1"), &mut spec).await.unwrap_err();
    assert!(matches!(err, FirestoreError::ServerError(503, _)));
}

#[tokio::test]
async fn test_private_document_routes_to_signed_in_user() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("{}/user-1/user-1", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "user-1/user-1",
            json!({"settings": {"mapValue": {}}}),
            VERSION_1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let doc = repo.read(None, None).await.unwrap();
    assert_eq!(doc.fields["settings"], Value::Map(Fields::new()));
}

#[tokio::test]
async fn test_create_and_delete() {
    let server = MockServer::start().await;
    let repo = signed_in_repo(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/notes", DOCS)))
        .and(query_param("documentId", "n1"))
        .and(body_partial_json(json!({"fields": {"title": {"stringValue": "hi"}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(
            "notes/n1",
            json!({"title": {"stringValue": "hi"}}),
            VERSION_1,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/notes", DOCS)))
        .and(query_param("documentId", "n1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(error_body(
            409,
            "ALREADY_EXISTS",
            "Document already exists",
        )))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/notes/n1", DOCS)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fields: Fields = [("title".to_string(), Value::from("hi"))].into_iter().collect();
    let created = assert_ok!(repo.create(Some("notes"), Some("n1"), &fields).await);
    assert_eq!(created.fields, fields);
    assert_eq!(created.version.as_str(), VERSION_1);

    let err = repo.create(Some("notes"), Some("n1"), &fields).await.unwrap_err();
    assert!(matches!(err, FirestoreError::AlreadyExists(_)));

    assert_ok!(repo.delete(Some("notes"), Some("n1")).await);
}

#[tokio::test]
async fn test_signed_out_client_cannot_read() {
    let server = MockServer::start().await;
    let config = FirestoreConfig::new("demo", "test-key").with_base_url(&server.uri());
    let repo = DocumentRepository::new(FirestoreClient::new(config).unwrap());

    let err = repo.read(Some("docs"), Some("d1")).await.unwrap_err();
    assert!(matches!(err, FirestoreError::Authentication(_)));
}

//! # Tests for Handlers
//!
//! Router-level tests against an in-memory SQLite database.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::AppConfig;
use crate::connectors::embeddings::EmbeddingProvider;
use crate::crypto::CryptoKey;
use crate::destinations::DefaultAdapterFactory;
use crate::error::SyncError;
use crate::server::{AppState, create_app};

struct FixedEmbeddings;

#[async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        Ok(inputs.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
    }
}

async fn setup_test_app() -> (AppState, Router) {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open sqlite");
    Migrator::up(&db, None).await.expect("apply migrations");

    let config = AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        ..Default::default()
    };
    let crypto_key = CryptoKey::new(vec![7u8; 32]).expect("Failed to create test crypto key");
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(FixedEmbeddings);
    let factory = Arc::new(DefaultAdapterFactory::new(&config, embeddings.clone()));

    let state = AppState::new(config, db, crypto_key, embeddings, factory);
    let app = create_app(state.clone());
    (state, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_pds(app: &Router, name: &str, url: &str) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": name,
            "kind": "pds",
            "direction": "source",
            "credentials": {"url": url, "username": "sync", "password": "hunter2"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_relational(app: &Router, name: &str) -> Uuid {
    let (status, body) = send(
        app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": name,
            "kind": "relational",
            "direction": "destination",
            "credentials": {
                "host": "db.internal", "port": 5432, "database": "dw",
                "username": "writer", "password": "s3cret"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_table(app: &Router, source: Uuid, destination: Uuid, columns: Value) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/table-configs",
        Some(json!({
            "config_name": "customers",
            "table_name": "CUSTOMERS",
            "source_connection_id": source,
            "destination_connection_id": destination,
            "page_size": 500,
            "columns": columns
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let (_state, app) = setup_test_app().await;
    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "pds-sync");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_reports_database_ok() {
    let (_state, app) = setup_test_app().await;
    let (status, body) = send(&app, Method::GET, "/healthz", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_trace_id_is_echoed() {
    let (_state, app) = setup_test_app().await;
    let request = Request::builder()
        .uri("/")
        .header("x-trace-id", "trace-abc")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
}

#[tokio::test]
async fn test_connection_credentials_are_redacted() {
    let (_state, app) = setup_test_app().await;
    let id = create_pds(&app, "PDS prod", "https://pds.example.com").await;

    let (status, body) = send(&app, Method::GET, &format!("/connections/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credentials"]["username"], "sync");
    assert_ne!(body["credentials"]["password"], "hunter2");

    let (_, list) = send(&app, Method::GET, "/connections", None).await;
    assert!(!list.to_string().contains("hunter2"));
    assert_eq!(list["connections"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connection_rejects_unknown_credential_fields() {
    let (_state, app) = setup_test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": "qdrant",
            "kind": "vector_store",
            "direction": "destination",
            "credentials": {"host": "qdrant", "port": 6333, "password": "x"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_connection_direction_must_match_kind() {
    let (_state, app) = setup_test_app().await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": "backwards",
            "kind": "pds",
            "direction": "destination",
            "credentials": {"url": "https://pds", "username": "u", "password": "p"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_connection_name_conflicts() {
    let (_state, app) = setup_test_app().await;
    create_pds(&app, "dup", "https://pds.example.com").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": "dup",
            "kind": "pds",
            "direction": "source",
            "credentials": {"url": "https://other", "username": "u", "password": "p"}
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_referenced_connection_cannot_be_deleted() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    create_table(&app, source, destination, json!([])).await;

    let (status, _) = send(&app, Method::DELETE, &format!("/connections/{source}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::GET, &format!("/connections/{source}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_table_config_detail_and_payload_preview() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    let created = create_table(
        &app,
        source,
        destination,
        json!([
            {"column_name": "CUSTOMER_ID", "data_type": "integer", "is_primary_key": true},
            {"column_name": "NAME"},
            {"column_name": "LEGACY_CODE", "active": false}
        ]),
    )
    .await;
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["columns"].as_array().unwrap().len(), 3);

    let (status, payload) =
        send(&app, Method::GET, &format!("/table-configs/{id}/payload"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload,
        json!({
            "name": "CUSTOMERS",
            "pageSize": "500",
            "tables": [{"tableName": "UNIFIER_CUSTOMERS", "columns": ["CUSTOMER_ID", "NAME"]}]
        })
    );
}

#[tokio::test]
async fn test_column_upsert_by_name_reports_counts() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    let created = create_table(&app, source, destination, json!([{"column_name": "ID"}])).await;
    let id = created["id"].as_str().unwrap();

    let (status, summary) = send(
        &app,
        Method::PUT,
        &format!("/table-configs/{id}/columns"),
        Some(json!([
            {"column_name": "ID", "is_primary_key": true},
            {"column_name": "EMAIL", "data_type": "string"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary, json!({"created": 1, "updated": 1}));

    let (_, columns) = send(&app, Method::GET, &format!("/table-configs/{id}/columns"), None).await;
    let columns = columns["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0]["column_name"], "ID");
    assert_eq!(columns[0]["is_primary_key"], true);
}

#[tokio::test]
async fn test_invalid_column_identifier_is_rejected() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    let created = create_table(&app, source, destination, json!([])).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/table-configs/{id}/columns"),
        Some(json!({"column_name": "name; DROP TABLE x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_copy_duplicates_columns() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    let created = create_table(
        &app,
        source,
        destination,
        json!([{"column_name": "ID", "is_primary_key": true}, {"column_name": "NAME"}]),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, copy) = send(
        &app,
        Method::POST,
        &format!("/table-configs/{id}/copy"),
        Some(json!({"config_name": "customers_copy"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(copy["id"], created["id"]);
    assert_eq!(copy["config_name"], "customers_copy");
    assert_eq!(copy["columns"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_without_active_columns_writes_no_ledger_entry() {
    let (_state, app) = setup_test_app().await;
    let source = create_pds(&app, "src", "https://pds.example.com").await;
    let destination = create_relational(&app, "dst").await;
    let created = create_table(&app, source, destination, json!([])).await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send(&app, Method::POST, &format!("/table-configs/{id}/sync"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["code"], "SYNC_CONFIGURATION");

    let (status, runs) =
        send(&app, Method::GET, &format!("/table-configs/{id}/sync-runs"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(runs["runs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_sync_run_is_not_found() {
    let (_state, app) = setup_test_app().await;
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/sync-runs/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_limit_is_validated() {
    let (_state, app) = setup_test_app().await;
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/table-configs/{}/sync-runs?limit=0", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_status_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest-service/v1/config/status/seed/ds_unifier"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("Metadata Seeding Status : SUCCESS"),
        )
        .mount(&server)
        .await;

    let (_state, app) = setup_test_app().await;
    let id = create_pds(&app, "src", &server.uri()).await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/connections/{id}/metadata/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
}

#[tokio::test]
async fn test_metadata_refresh_failure_is_reported_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest-service/dataservice/metadata/refresh"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (_state, app) = setup_test_app().await;
    let id = create_pds(&app, "src", &server.uri()).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/connections/{id}/metadata/refresh"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ERROR");
    assert!(body["detail"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn test_metadata_on_destination_connection_is_rejected() {
    let (_state, app) = setup_test_app().await;
    let id = create_relational(&app, "dst").await;

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/connections/{id}/metadata/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_collections_require_vector_store_connection() {
    let (_state, app) = setup_test_app().await;
    let id = create_pds(&app, "src", "https://pds.example.com").await;

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/connections/{id}/collections"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "NOT_A_VECTOR_STORE");
}

#[tokio::test]
async fn test_search_embeds_query_and_returns_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/collections/customers/points/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{"id": "5b1c0a5e-0000-4000-8000-000000000000", "score": 0.92, "payload": {"NAME": "Ada"}}],
            "status": "ok",
            "time": 0.001
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = url::Url::parse(&server.uri()).unwrap();
    let (_state, app) = setup_test_app().await;
    let (status, created) = send(
        &app,
        Method::POST,
        "/connections",
        Some(json!({
            "name": "qdrant",
            "kind": "vector_store",
            "direction": "destination",
            "credentials": {"host": url.host_str().unwrap(), "port": url.port().unwrap()}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/connections/{id}/collections/customers/search"),
        Some(json!({"query": "Ada", "limit": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["hits"][0]["payload"]["NAME"], "Ada");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/connections/{id}/collections/customers/search"),
        Some(json!({"query": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

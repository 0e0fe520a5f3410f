//! # Connections API Handlers
//!
//! CRUD over source and destination connection descriptors. Credentials
//! are accepted in full on write and always returned redacted.

use crate::error::ApiError;
use crate::models::connection::{self, ConnectionKind, Direction};
use crate::repositories::connection::{ConnectionChanges, NewConnection};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

/// Connection information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(example = "PDS production")]
    pub name: String,
    pub description: Option<String>,
    pub kind: ConnectionKind,
    pub direction: Direction,
    /// Credentials with passwords and API keys masked
    #[schema(value_type = Object)]
    pub credentials: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionInfo {
    fn new(model: connection::Model, credentials: Value) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            kind: model.kind,
            direction: model.direction,
            credentials,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Request body for creating a connection
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: ConnectionKind,
    pub direction: Direction,
    /// Kind-specific credentials; unknown fields are rejected
    #[schema(value_type = Object, example = json!({"url": "https://pds.example.com", "username": "sync", "password": "secret"}))]
    pub credentials: Value,
}

/// Request body for updating a connection; omitted fields are left unchanged
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateConnectionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub credentials: Option<Value>,
}

/// Response wrapper for connection listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

fn redacted_info(state: &AppState, model: connection::Model) -> Result<ConnectionInfo, ApiError> {
    let credentials = state.connections().credentials(&model)?;
    Ok(ConnectionInfo::new(model, credentials.redacted()))
}

/// Lists all connections ordered by name
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "All connections", body = ConnectionsResponse),
        (status = 500, description = "Internal error", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let repo = state.connections();
    let models = repo.list().await?;

    let mut connections = Vec::with_capacity(models.len());
    for model in models {
        // One undecryptable row must not hide the others
        let credentials = match repo.credentials(&model) {
            Ok(creds) => creds.redacted(),
            Err(err) => {
                tracing::warn!(connection_id = %model.id, error = %err, "Stored credentials unreadable");
                Value::Null
            }
        };
        connections.push(ConnectionInfo::new(model, credentials));
    }

    Ok(Json(ConnectionsResponse { connections }))
}

/// Creates a connection after validating its credentials against its kind
#[utoipa::path(
    post,
    path = "/connections",
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    Json(request): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>), ApiError> {
    let model = state
        .connections()
        .create(NewConnection {
            name: request.name,
            description: request.description,
            kind: request.kind,
            direction: request.direction,
            credentials: request.credentials,
        })
        .await?;

    tracing::info!(connection_id = %model.id, kind = ?model.kind, "Connection created");
    Ok((StatusCode::CREATED, Json(redacted_info(&state, model)?)))
}

/// Fetches one connection
#[utoipa::path(
    get,
    path = "/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Connection", body = ConnectionInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let model = state.connections().get(id).await?;
    Ok(Json(redacted_info(&state, model)?))
}

/// Updates name, description or credentials; kind and direction are fixed
#[utoipa::path(
    put,
    path = "/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    request_body = UpdateConnectionRequest,
    responses(
        (status = 200, description = "Connection updated", body = ConnectionInfo),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateConnectionRequest>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let model = state
        .connections()
        .update(
            id,
            ConnectionChanges {
                name: request.name,
                description: request.description,
                credentials: request.credentials,
            },
        )
        .await?;
    Ok(Json(redacted_info(&state, model)?))
}

/// Deletes a connection that no table configuration references
#[utoipa::path(
    delete,
    path = "/connections/{id}",
    params(("id" = String, Path, description = "Connection id")),
    responses(
        (status = 204, description = "Connection deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Connection still referenced", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.connections().delete(id).await?;
    tracing::info!(connection_id = %id, "Connection deleted");
    Ok(StatusCode::NO_CONTENT)
}

//! # PDS Metadata Handlers
//!
//! Remote failures are reported as an `ERROR` status in a 200 body.

use crate::connectors::remote_query::{MetadataStatus, PdsClient};
use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Metadata seeding state of a PDS connection
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetadataResponse {
    #[schema(value_type = String)]
    pub connection_id: Uuid,
    pub status: MetadataStatus,
    /// Error text when `status` is `ERROR`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

async fn client_for(state: &AppState, id: Uuid) -> Result<PdsClient, ApiError> {
    // 404 for unknown ids before the kind check turns it into a 422
    state.connections().get(id).await?;
    Ok(state.orchestrator.pds_client(id).await?)
}

/// Triggers a metadata refresh and polls its status
#[utoipa::path(
    post,
    path = "/connections/{id}/metadata/refresh",
    params(("id" = String, Path, description = "PDS connection id")),
    responses(
        (status = 200, description = "Last observed seeding status", body = MetadataResponse),
        (status = 404, description = "Not found", body = ApiError),
        (status = 422, description = "Not a PDS connection", body = ApiError)
    ),
    tag = "metadata"
)]
pub async fn refresh_metadata(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let client = client_for(&state, id).await?;
    let poll = &state.config.metadata;

    let response = match client.refresh_and_wait(poll.attempts, poll.interval()).await {
        Ok(status) => MetadataResponse {
            connection_id: id,
            status,
            detail: None,
        },
        Err(err) => {
            tracing::warn!(connection_id = %id, error = %err, "Metadata refresh failed");
            MetadataResponse {
                connection_id: id,
                status: MetadataStatus::Error,
                detail: Some(err.to_string()),
            }
        }
    };
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/connections/{id}/metadata/status",
    params(("id" = String, Path, description = "PDS connection id")),
    responses(
        (status = 200, description = "Current seeding status", body = MetadataResponse),
        (status = 404, description = "Not found", body = ApiError),
        (status = 422, description = "Not a PDS connection", body = ApiError)
    ),
    tag = "metadata"
)]
pub async fn metadata_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let client = client_for(&state, id).await?;

    let (status, detail) = match client.metadata_status().await {
        Ok(status) => (status, None),
        Err(err) => (MetadataStatus::Error, Some(err.to_string())),
    };
    Ok(Json(MetadataResponse {
        connection_id: id,
        status,
        detail,
    }))
}

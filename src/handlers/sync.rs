//! # Sync Handlers
//!
//! Triggering runs and reading the run ledger.

use crate::error::ApiError;
use crate::models::sync_run::{self, SyncStatus};
use crate::server::AppState;
use crate::sync_orchestrator::RunSummary;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 500;

/// Ledger entry for one run
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub table_config_id: Uuid,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_columns: i32,
    pub total_creates: i64,
    pub total_updates: i64,
    pub total_skipped: i64,
    pub error_message: Option<String>,
}

impl From<sync_run::Model> for SyncRunInfo {
    fn from(model: sync_run::Model) -> Self {
        Self {
            id: model.id,
            table_config_id: model.table_config_id,
            status: model.status,
            started_at: model.started_at.with_timezone(&Utc),
            finished_at: model.finished_at.map(|t| t.with_timezone(&Utc)),
            total_columns: model.total_columns,
            total_creates: model.total_creates,
            total_updates: model.total_updates,
            total_skipped: model.total_skipped,
            error_message: model.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncRunsResponse {
    pub runs: Vec<SyncRunInfo>,
}

/// Query parameters for run history
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum number of runs to return (default: 50, max: 500)
    pub limit: Option<u64>,
}

/// Runs a sync to completion and returns its summary.
///
/// The run executes on its own task: a client that disconnects does not
/// abort it, and the ledger entry is still finalized.
#[utoipa::path(
    post,
    path = "/table-configs/{id}/sync",
    params(("id" = String, Path, description = "Table configuration id")),
    responses(
        (status = 200, description = "Run completed", body = RunSummary),
        (status = 409, description = "A run for this table is already in progress", body = ApiError),
        (status = 422, description = "Configuration cannot be synced", body = ApiError),
        (status = 502, description = "Source or destination failed", body = ApiError),
        (status = 504, description = "Run cancelled or timed out", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunSummary>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let cancel = state.shutdown.child_token();

    let handle = tokio::spawn(async move { orchestrator.run(id, cancel).await });
    let summary = handle.await.map_err(|err| {
        tracing::error!(table_config_id = %id, error = %err, "Sync task panicked");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "sync task failed unexpectedly",
        )
    })??;

    Ok(Json(summary))
}

/// Latest run of every table configuration
#[utoipa::path(
    get,
    path = "/sync-runs",
    responses(
        (status = 200, description = "Latest run per table", body = SyncRunsResponse)
    ),
    tag = "sync"
)]
pub async fn latest_runs(State(state): State<AppState>) -> Result<Json<SyncRunsResponse>, ApiError> {
    let runs = state
        .sync_runs()
        .latest_per_table()
        .await?
        .into_iter()
        .map(SyncRunInfo::from)
        .collect();
    Ok(Json(SyncRunsResponse { runs }))
}

/// Run history of one table, newest first
#[utoipa::path(
    get,
    path = "/table-configs/{id}/sync-runs",
    params(("id" = String, Path, description = "Table configuration id"), HistoryQuery),
    responses(
        (status = 200, description = "Run history", body = SyncRunsResponse),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn table_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<SyncRunsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT),
        ));
    }

    state.table_configs().get(id).await?;
    let runs = state
        .sync_runs()
        .list_for_table(id, limit)
        .await?
        .into_iter()
        .map(SyncRunInfo::from)
        .collect();
    Ok(Json(SyncRunsResponse { runs }))
}

#[utoipa::path(
    get,
    path = "/sync-runs/{id}",
    params(("id" = String, Path, description = "Sync run id")),
    responses(
        (status = 200, description = "Run", body = SyncRunInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncRunInfo>, ApiError> {
    Ok(Json(state.sync_runs().get(id).await?.into()))
}

/// Deletes a finished run from the ledger
#[utoipa::path(
    delete,
    path = "/sync-runs/{id}",
    params(("id" = String, Path, description = "Sync run id")),
    responses(
        (status = 204, description = "Run deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Run still in progress", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sync_runs().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

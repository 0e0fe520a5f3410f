//! # Table Configuration Handlers
//!
//! Table configurations map one PDS table onto one destination. Column
//! declarations hang off a configuration and decide what gets queried,
//! which values form the primary key and what the destination DDL looks like.

use crate::connectors::remote_query::{QueryPayload, build_payload};
use crate::error::ApiError;
use crate::models::{table_column, table_config};
use crate::repositories::table_config::{
    ColumnDraft, ColumnFlagUpdate, ColumnUpsertSummary, NewTableConfig, TableConfigChanges,
};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Table configuration as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TableConfigInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(example = "customers")]
    pub config_name: String,
    #[schema(example = "CUSTOMERS")]
    pub table_name: String,
    pub title: Option<String>,
    #[schema(value_type = String)]
    pub source_connection_id: Uuid,
    #[schema(value_type = String)]
    pub destination_connection_id: Uuid,
    #[schema(example = 1000)]
    pub page_size: i32,
    #[schema(example = 100)]
    pub batch_size: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<table_config::Model> for TableConfigInfo {
    fn from(model: table_config::Model) -> Self {
        Self {
            id: model.id,
            config_name: model.config_name,
            table_name: model.table_name,
            title: model.title,
            source_connection_id: model.source_connection_id,
            destination_connection_id: model.destination_connection_id,
            page_size: model.page_size,
            batch_size: model.batch_size,
            active: model.active,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Column declaration as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(example = "CUSTOMER_ID")]
    pub column_name: String,
    #[schema(example = "integer")]
    pub data_type: String,
    pub active: bool,
    pub is_primary_key: bool,
    pub position: i32,
}

impl From<table_column::Model> for ColumnInfo {
    fn from(model: table_column::Model) -> Self {
        Self {
            id: model.id,
            column_name: model.column_name,
            data_type: model.data_type,
            active: model.active,
            is_primary_key: model.is_primary_key,
            position: model.position,
        }
    }
}

/// Configuration together with its declared columns
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TableConfigDetail {
    #[serde(flatten)]
    pub config: TableConfigInfo,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TableConfigsResponse {
    pub table_configs: Vec<TableConfigInfo>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnInfo>,
}

/// Request body for creating a table configuration
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTableConfigRequest {
    pub config_name: String,
    pub table_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[schema(value_type = String)]
    pub source_connection_id: Uuid,
    #[schema(value_type = String)]
    pub destination_connection_id: Uuid,
    /// Rows per PDS page, 1 to 10000 (default 1000)
    #[serde(default)]
    pub page_size: Option<i32>,
    /// Rows per vector upsert batch, 1 to 10000 (default 100)
    #[serde(default)]
    pub batch_size: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
    /// Columns declared together with the configuration
    #[serde(default)]
    pub columns: Vec<ColumnDraft>,
}

/// Partial update of a table configuration
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTableConfigRequest {
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub source_connection_id: Option<Uuid>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub destination_connection_id: Option<Uuid>,
    #[serde(default)]
    pub page_size: Option<i32>,
    #[serde(default)]
    pub batch_size: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Request body for copying a configuration under a new name
#[derive(Debug, Deserialize, ToSchema)]
pub struct CopyTableConfigRequest {
    #[schema(example = "customers_copy")]
    pub config_name: String,
}

async fn detail(state: &AppState, config: table_config::Model) -> Result<TableConfigDetail, ApiError> {
    let columns = state.table_configs().list_columns(config.id).await?;
    Ok(TableConfigDetail {
        config: config.into(),
        columns: columns.into_iter().map(ColumnInfo::from).collect(),
    })
}

/// Lists table configurations ordered by name
#[utoipa::path(
    get,
    path = "/table-configs",
    responses(
        (status = 200, description = "All table configurations", body = TableConfigsResponse)
    ),
    tag = "table-configs"
)]
pub async fn list_table_configs(
    State(state): State<AppState>,
) -> Result<Json<TableConfigsResponse>, ApiError> {
    let table_configs = state
        .table_configs()
        .list()
        .await?
        .into_iter()
        .map(TableConfigInfo::from)
        .collect();
    Ok(Json(TableConfigsResponse { table_configs }))
}

/// Creates a table configuration, optionally with its columns
#[utoipa::path(
    post,
    path = "/table-configs",
    request_body = CreateTableConfigRequest,
    responses(
        (status = 201, description = "Configuration created", body = TableConfigDetail),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn create_table_config(
    State(state): State<AppState>,
    Json(request): Json<CreateTableConfigRequest>,
) -> Result<(StatusCode, Json<TableConfigDetail>), ApiError> {
    let repo = state.table_configs();
    let config = repo
        .create(NewTableConfig {
            config_name: request.config_name,
            table_name: request.table_name,
            title: request.title,
            source_connection_id: request.source_connection_id,
            destination_connection_id: request.destination_connection_id,
            page_size: request.page_size,
            batch_size: request.batch_size,
            active: request.active,
        })
        .await?;

    if !request.columns.is_empty() {
        repo.upsert_columns(config.id, request.columns).await?;
    }

    tracing::info!(table_config_id = %config.id, config_name = %config.config_name, "Table configuration created");
    Ok((StatusCode::CREATED, Json(detail(&state, config).await?)))
}

/// Fetches a configuration with its columns
#[utoipa::path(
    get,
    path = "/table-configs/{id}",
    params(("id" = String, Path, description = "Table configuration id")),
    responses(
        (status = 200, description = "Configuration", body = TableConfigDetail),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn get_table_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TableConfigDetail>, ApiError> {
    let config = state.table_configs().get(id).await?;
    Ok(Json(detail(&state, config).await?))
}

#[utoipa::path(
    put,
    path = "/table-configs/{id}",
    params(("id" = String, Path, description = "Table configuration id")),
    request_body = UpdateTableConfigRequest,
    responses(
        (status = 200, description = "Configuration updated", body = TableConfigDetail),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn update_table_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTableConfigRequest>,
) -> Result<Json<TableConfigDetail>, ApiError> {
    let config = state
        .table_configs()
        .update(
            id,
            TableConfigChanges {
                config_name: request.config_name,
                table_name: request.table_name,
                title: request.title,
                source_connection_id: request.source_connection_id,
                destination_connection_id: request.destination_connection_id,
                page_size: request.page_size,
                batch_size: request.batch_size,
                active: request.active,
            },
        )
        .await?;
    Ok(Json(detail(&state, config).await?))
}

/// Deletes a configuration and its columns; run history is kept
#[utoipa::path(
    delete,
    path = "/table-configs/{id}",
    params(("id" = String, Path, description = "Table configuration id")),
    responses(
        (status = 204, description = "Configuration deleted"),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "A sync is running for this table", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn delete_table_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.orchestrator.is_running(id) {
        return Err(crate::error::conflict(
            "cannot delete a table configuration while it is syncing",
        ));
    }
    state.table_configs().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Duplicates a configuration and its columns under a new name
#[utoipa::path(
    post,
    path = "/table-configs/{id}/copy",
    params(("id" = String, Path, description = "Table configuration to copy")),
    request_body = CopyTableConfigRequest,
    responses(
        (status = 201, description = "Copy created", body = TableConfigDetail),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Name already taken", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn copy_table_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CopyTableConfigRequest>,
) -> Result<(StatusCode, Json<TableConfigDetail>), ApiError> {
    let copy = state.table_configs().copy(id, &request.config_name).await?;
    Ok((StatusCode::CREATED, Json(detail(&state, copy).await?)))
}

/// First-page PDS query body the configuration would send
#[utoipa::path(
    get,
    path = "/table-configs/{id}/payload",
    params(("id" = String, Path, description = "Table configuration id")),
    responses(
        (status = 200, description = "Query payload", body = QueryPayload),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "table-configs"
)]
pub async fn preview_payload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueryPayload>, ApiError> {
    let repo = state.table_configs();
    let config = repo.get(id).await?;
    let columns: Vec<String> = repo
        .active_columns(id)
        .await?
        .into_iter()
        .map(|c| c.column_name)
        .collect();
    Ok(Json(build_payload(
        &config.table_name,
        config.page_size,
        &columns,
        None,
    )))
}

#[utoipa::path(
    get,
    path = "/table-configs/{id}/columns",
    params(("id" = String, Path, description = "Table configuration id")),
    responses(
        (status = 200, description = "Declared columns in order", body = ColumnsResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn list_columns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    let repo = state.table_configs();
    repo.get(id).await?;
    let columns = repo
        .list_columns(id)
        .await?
        .into_iter()
        .map(ColumnInfo::from)
        .collect();
    Ok(Json(ColumnsResponse { columns }))
}

#[utoipa::path(
    post,
    path = "/table-configs/{id}/columns",
    params(("id" = String, Path, description = "Table configuration id")),
    request_body = ColumnDraft,
    responses(
        (status = 201, description = "Column added", body = ColumnInfo),
        (status = 400, description = "Invalid column name", body = ApiError),
        (status = 404, description = "Not found", body = ApiError),
        (status = 409, description = "Column already declared", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn add_column(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ColumnDraft>,
) -> Result<(StatusCode, Json<ColumnInfo>), ApiError> {
    let column = state.table_configs().add_column(id, draft).await?;
    Ok((StatusCode::CREATED, Json(column.into())))
}

#[utoipa::path(
    put,
    path = "/table-configs/{id}/columns/{column_id}",
    params(
        ("id" = String, Path, description = "Table configuration id"),
        ("column_id" = String, Path, description = "Column id")
    ),
    request_body = ColumnDraft,
    responses(
        (status = 200, description = "Column updated", body = ColumnInfo),
        (status = 400, description = "Invalid column name", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn update_column(
    State(state): State<AppState>,
    Path((id, column_id)): Path<(Uuid, Uuid)>,
    Json(draft): Json<ColumnDraft>,
) -> Result<Json<ColumnInfo>, ApiError> {
    let column = state
        .table_configs()
        .update_column(id, column_id, draft)
        .await?;
    Ok(Json(column.into()))
}

#[utoipa::path(
    delete,
    path = "/table-configs/{id}/columns/{column_id}",
    params(
        ("id" = String, Path, description = "Table configuration id"),
        ("column_id" = String, Path, description = "Column id")
    ),
    responses(
        (status = 204, description = "Column deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn delete_column(
    State(state): State<AppState>,
    Path((id, column_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state.table_configs().delete_column(id, column_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Applies active and primary-key flag changes to several columns at once
#[utoipa::path(
    patch,
    path = "/table-configs/{id}/columns",
    params(("id" = String, Path, description = "Table configuration id")),
    request_body = Vec<ColumnFlagUpdate>,
    responses(
        (status = 200, description = "Columns after the update", body = ColumnsResponse),
        (status = 404, description = "Configuration or column not found", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn bulk_update_flags(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(updates): Json<Vec<ColumnFlagUpdate>>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    let columns = state
        .table_configs()
        .bulk_update_flags(id, updates)
        .await?
        .into_iter()
        .map(ColumnInfo::from)
        .collect();
    Ok(Json(ColumnsResponse { columns }))
}

/// Upserts column declarations by name
#[utoipa::path(
    put,
    path = "/table-configs/{id}/columns",
    params(("id" = String, Path, description = "Table configuration id")),
    request_body = Vec<ColumnDraft>,
    responses(
        (status = 200, description = "Counts of created and updated columns", body = ColumnUpsertSummary),
        (status = 400, description = "Invalid or duplicate column names", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "columns"
)]
pub async fn upsert_columns(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(drafts): Json<Vec<ColumnDraft>>,
) -> Result<Json<ColumnUpsertSummary>, ApiError> {
    let summary = state.table_configs().upsert_columns(id, drafts).await?;
    Ok(Json(summary))
}

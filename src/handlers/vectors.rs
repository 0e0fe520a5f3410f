//! # Vector Collection Handlers
//!
//! Read-mostly browsing of collections on a vector store connection, plus
//! collection deletion and semantic search through the configured
//! embedding provider.

use crate::connectors::credentials::ConnectionCredentials;
use crate::connectors::vector_store::{
    CollectionInfo, QdrantClient, ScoredPoint, ScrollPage, VectorStoreError,
};
use crate::error::{ApiError, not_found, upstream_error, validation_error};
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_SCROLL_LIMIT: u32 = 20;
const MAX_SCROLL_LIMIT: u32 = 1000;
const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CollectionsResponse {
    pub collections: Vec<String>,
}

/// Query parameters for point scrolling
#[derive(Debug, Deserialize, IntoParams)]
pub struct ScrollQuery {
    /// Page size (default: 20, max: 1000)
    pub limit: Option<u32>,
    /// `next_page_offset` from the previous page
    pub offset: Option<String>,
}

/// Semantic search request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    #[schema(example = "customers in Berlin")]
    pub query: String,
    /// Number of hits (default: 10, max: 1000)
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub hits: Vec<ScoredPoint>,
}

fn store_error(err: VectorStoreError) -> ApiError {
    let body = match &err {
        VectorStoreError::Api { body, .. } => Some(body.as_str()),
        _ => None,
    };
    upstream_error("vector_store", err.status(), body, &err.to_string())
}

async fn client_for(state: &AppState, id: Uuid) -> Result<QdrantClient, ApiError> {
    let repo = state.connections();
    let connection = repo.get(id).await?;
    match repo.credentials(&connection)? {
        ConnectionCredentials::VectorStore(creds) => {
            QdrantClient::new(&creds, state.config.sync.vector_timeout()).map_err(store_error)
        }
        _ => Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "NOT_A_VECTOR_STORE",
            &format!("connection '{}' is not a vector store", connection.name),
        )),
    }
}

fn check_limit(limit: u32) -> Result<u32, ApiError> {
    if (1..=MAX_SCROLL_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(validation_error(
            "invalid limit",
            json!({ "limit": format!("must be between 1 and {}", MAX_SCROLL_LIMIT) }),
        ))
    }
}

/// Scroll offsets are point ids: unsigned integers or UUID strings
fn parse_offset(raw: &str) -> Value {
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[utoipa::path(
    get,
    path = "/connections/{id}/collections",
    params(("id" = String, Path, description = "Vector store connection id")),
    responses(
        (status = 200, description = "Collection names", body = CollectionsResponse),
        (status = 404, description = "Not found", body = ApiError),
        (status = 422, description = "Not a vector store connection", body = ApiError),
        (status = 502, description = "Vector store failed", body = ApiError)
    ),
    tag = "vectors"
)]
pub async fn list_collections(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CollectionsResponse>, ApiError> {
    let client = client_for(&state, id).await?;
    let collections = client.list_collections().await.map_err(store_error)?;
    Ok(Json(CollectionsResponse { collections }))
}

#[utoipa::path(
    get,
    path = "/connections/{id}/collections/{name}",
    params(
        ("id" = String, Path, description = "Vector store connection id"),
        ("name" = String, Path, description = "Collection name")
    ),
    responses(
        (status = 200, description = "Collection details", body = CollectionInfo),
        (status = 404, description = "Connection or collection not found", body = ApiError),
        (status = 502, description = "Vector store failed", body = ApiError)
    ),
    tag = "vectors"
)]
pub async fn collection_info(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Json<CollectionInfo>, ApiError> {
    let client = client_for(&state, id).await?;
    client
        .collection_info(&name)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found("collection", &name))
}

#[utoipa::path(
    delete,
    path = "/connections/{id}/collections/{name}",
    params(
        ("id" = String, Path, description = "Vector store connection id"),
        ("name" = String, Path, description = "Collection name")
    ),
    responses(
        (status = 204, description = "Collection deleted"),
        (status = 404, description = "Connection or collection not found", body = ApiError),
        (status = 502, description = "Vector store failed", body = ApiError)
    ),
    tag = "vectors"
)]
pub async fn delete_collection(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let client = client_for(&state, id).await?;
    if !client.delete_collection(&name).await.map_err(store_error)? {
        return Err(not_found("collection", &name));
    }
    tracing::info!(connection_id = %id, collection = %name, "Collection deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Pages through stored points with their payloads
#[utoipa::path(
    get,
    path = "/connections/{id}/collections/{name}/points",
    params(
        ("id" = String, Path, description = "Vector store connection id"),
        ("name" = String, Path, description = "Collection name"),
        ScrollQuery
    ),
    responses(
        (status = 200, description = "One page of points", body = ScrollPage),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 502, description = "Vector store failed", body = ApiError)
    ),
    tag = "vectors"
)]
pub async fn scroll_points(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    Query(query): Query<ScrollQuery>,
) -> Result<Json<ScrollPage>, ApiError> {
    let limit = check_limit(query.limit.unwrap_or(DEFAULT_SCROLL_LIMIT))?;
    let offset = query
        .offset
        .as_deref()
        .filter(|o| !o.is_empty())
        .map(parse_offset);

    let client = client_for(&state, id).await?;
    let page = client
        .scroll(&name, limit, offset)
        .await
        .map_err(store_error)?;
    Ok(Json(page))
}

/// Embeds the query text and returns the nearest points
#[utoipa::path(
    post,
    path = "/connections/{id}/collections/{name}/search",
    params(
        ("id" = String, Path, description = "Vector store connection id"),
        ("name" = String, Path, description = "Collection name")
    ),
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Nearest points", body = SearchResponse),
        (status = 400, description = "Empty query or invalid limit", body = ApiError),
        (status = 502, description = "Embedding provider or vector store failed", body = ApiError)
    ),
    tag = "vectors"
)]
pub async fn search(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(validation_error(
            "query must not be empty",
            json!({ "query": "required" }),
        ));
    }
    let limit = check_limit(request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))?;

    let client = client_for(&state, id).await?;
    let vector = state
        .embeddings
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            upstream_error("embedding", None, None, "embedding provider returned no vector")
        })?;

    let hits = client
        .search(&name, &vector, limit)
        .await
        .map_err(store_error)?;
    Ok(Json(SearchResponse { hits }))
}

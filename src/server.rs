//! # Server Configuration
//!
//! Router assembly, shared state and the HTTP server loop.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::connectors::embeddings::EmbeddingProvider;
use crate::crypto::CryptoKey;
use crate::destinations::AdapterFactory;
use crate::handlers::{self, connections, metadata, sync, table_configs, vectors};
use crate::repositories::{ConnectionRepository, SyncRunRepository, TableConfigRepository};
use crate::sync_orchestrator::SyncOrchestrator;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Cancelled on shutdown; in-flight runs observe child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        crypto_key: CryptoKey,
        embeddings: Arc<dyn EmbeddingProvider>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(db.clone()),
            crypto_key.clone(),
            &config,
            factory,
        ));
        Self {
            config: Arc::new(config),
            db,
            crypto_key,
            embeddings,
            orchestrator,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn connections(&self) -> ConnectionRepository {
        ConnectionRepository::new(Arc::new(self.db.clone()), self.crypto_key.clone())
    }

    pub fn table_configs(&self) -> TableConfigRepository {
        TableConfigRepository::new(Arc::new(self.db.clone()))
    }

    pub fn sync_runs(&self) -> SyncRunRepository {
        SyncRunRepository::new(self.db.clone())
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/connections",
            get(connections::list_connections).post(connections::create_connection),
        )
        .route(
            "/connections/{id}",
            get(connections::get_connection)
                .put(connections::update_connection)
                .delete(connections::delete_connection),
        )
        .route(
            "/connections/{id}/metadata/refresh",
            post(metadata::refresh_metadata),
        )
        .route(
            "/connections/{id}/metadata/status",
            get(metadata::metadata_status),
        )
        .route(
            "/connections/{id}/collections",
            get(vectors::list_collections),
        )
        .route(
            "/connections/{id}/collections/{name}",
            get(vectors::collection_info).delete(vectors::delete_collection),
        )
        .route(
            "/connections/{id}/collections/{name}/points",
            get(vectors::scroll_points),
        )
        .route(
            "/connections/{id}/collections/{name}/search",
            post(vectors::search),
        )
        .route(
            "/table-configs",
            get(table_configs::list_table_configs).post(table_configs::create_table_config),
        )
        .route(
            "/table-configs/{id}",
            get(table_configs::get_table_config)
                .put(table_configs::update_table_config)
                .delete(table_configs::delete_table_config),
        )
        .route(
            "/table-configs/{id}/copy",
            post(table_configs::copy_table_config),
        )
        .route(
            "/table-configs/{id}/payload",
            get(table_configs::preview_payload),
        )
        .route(
            "/table-configs/{id}/columns",
            get(table_configs::list_columns)
                .post(table_configs::add_column)
                .patch(table_configs::bulk_update_flags)
                .put(table_configs::upsert_columns),
        )
        .route(
            "/table-configs/{id}/columns/{column_id}",
            put(table_configs::update_column).delete(table_configs::delete_column),
        )
        .route("/table-configs/{id}/sync", post(sync::trigger_sync))
        .route("/table-configs/{id}/sync-runs", get(sync::table_runs))
        .route("/sync-runs", get(sync::latest_runs))
        .route(
            "/sync-runs/{id}",
            get(sync::get_run).delete(sync::delete_run),
        )
        .with_state(state);

    api.merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given state and shuts down on Ctrl-C
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let shutdown = state.shutdown.clone();
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %state.config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested, cancelling in-flight syncs");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connections::list_connections,
        crate::handlers::connections::create_connection,
        crate::handlers::connections::get_connection,
        crate::handlers::connections::update_connection,
        crate::handlers::connections::delete_connection,
        crate::handlers::table_configs::list_table_configs,
        crate::handlers::table_configs::create_table_config,
        crate::handlers::table_configs::get_table_config,
        crate::handlers::table_configs::update_table_config,
        crate::handlers::table_configs::delete_table_config,
        crate::handlers::table_configs::copy_table_config,
        crate::handlers::table_configs::preview_payload,
        crate::handlers::table_configs::list_columns,
        crate::handlers::table_configs::add_column,
        crate::handlers::table_configs::update_column,
        crate::handlers::table_configs::delete_column,
        crate::handlers::table_configs::bulk_update_flags,
        crate::handlers::table_configs::upsert_columns,
        crate::handlers::sync::trigger_sync,
        crate::handlers::sync::latest_runs,
        crate::handlers::sync::table_runs,
        crate::handlers::sync::get_run,
        crate::handlers::sync::delete_run,
        crate::handlers::metadata::refresh_metadata,
        crate::handlers::metadata::metadata_status,
        crate::handlers::vectors::list_collections,
        crate::handlers::vectors::collection_info,
        crate::handlers::vectors::delete_collection,
        crate::handlers::vectors::scroll_points,
        crate::handlers::vectors::search,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::error::ApiError,
            crate::models::connection::ConnectionKind,
            crate::models::connection::Direction,
            crate::models::sync_run::SyncStatus,
            crate::connectors::credentials::PdsCredentials,
            crate::connectors::credentials::RelationalCredentials,
            crate::connectors::credentials::VectorStoreCredentials,
            crate::connectors::remote_query::QueryPayload,
            crate::connectors::remote_query::QueryTable,
            crate::connectors::remote_query::MetadataStatus,
            crate::connectors::vector_store::CollectionInfo,
            crate::connectors::vector_store::ScrollPage,
            crate::connectors::vector_store::ScoredPoint,
            crate::destinations::DestinationKind,
            crate::destinations::SkippedRow,
            crate::sync_orchestrator::RunSummary,
            crate::repositories::table_config::ColumnDraft,
            crate::repositories::table_config::ColumnFlagUpdate,
            crate::repositories::table_config::ColumnUpsertSummary,
            crate::handlers::connections::ConnectionInfo,
            crate::handlers::connections::ConnectionsResponse,
            crate::handlers::connections::CreateConnectionRequest,
            crate::handlers::connections::UpdateConnectionRequest,
            crate::handlers::table_configs::TableConfigInfo,
            crate::handlers::table_configs::TableConfigDetail,
            crate::handlers::table_configs::TableConfigsResponse,
            crate::handlers::table_configs::ColumnInfo,
            crate::handlers::table_configs::ColumnsResponse,
            crate::handlers::table_configs::CreateTableConfigRequest,
            crate::handlers::table_configs::UpdateTableConfigRequest,
            crate::handlers::table_configs::CopyTableConfigRequest,
            crate::handlers::sync::SyncRunInfo,
            crate::handlers::sync::SyncRunsResponse,
            crate::handlers::metadata::MetadataResponse,
            crate::handlers::vectors::CollectionsResponse,
            crate::handlers::vectors::SearchRequest,
            crate::handlers::vectors::SearchResponse,
        )
    ),
    tags(
        (name = "connections", description = "Source and destination connections"),
        (name = "table-configs", description = "Table configurations"),
        (name = "columns", description = "Column declarations"),
        (name = "sync", description = "Sync runs and history"),
        (name = "metadata", description = "PDS metadata seeding"),
        (name = "vectors", description = "Vector collection browsing"),
    ),
    info(
        title = "PDS Sync API",
        description = "Configure PDS tables and sync them into relational or vector destinations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

//! # PDS Sync Main Entry Point
//!
//! Serves the HTTP API by default; `migrate`, `sync` and `metadata-status`
//! run a single operation and exit.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pds_sync::{
    config::{AppConfig, ConfigLoader},
    connectors::embeddings::{EmbeddingProvider, OpenAiEmbeddings},
    crypto::CryptoKey,
    db,
    destinations::DefaultAdapterFactory,
    server::{AppState, run_server},
    telemetry::init_tracing,
};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "pds-sync", version, about = "Sync PDS tables into relational or vector destinations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations, then serve the HTTP API
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Run one sync and print its summary as JSON
    Sync {
        /// Table configuration id
        table_config_id: Uuid,
    },
    /// Print the metadata seeding status of a PDS connection
    MetadataStatus {
        connection_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    init_tracing(&config).context("initializing telemetry")?;
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Configuration loaded");
    }

    let db = db::connect(&config)
        .await
        .context("connecting to the metadata store")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => migrate(&db).await,
        Command::Serve => {
            migrate(&db).await?;
            let state = build_state(config, db)?;
            let orphaned = state
                .sync_runs()
                .fail_orphaned()
                .await
                .context("closing orphaned sync runs")?;
            if orphaned > 0 {
                tracing::warn!(orphaned, "Marked interrupted sync runs as failed");
            }
            run_server(state).await
        }
        Command::Sync { table_config_id } => {
            let state = build_state(config, db)?;
            let cancel = state.shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling sync");
                    cancel.cancel();
                }
            });

            let summary = state
                .orchestrator
                .run(table_config_id, state.shutdown.child_token())
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::MetadataStatus { connection_id } => {
            let state = build_state(config, db)?;
            let client = state.orchestrator.pds_client(connection_id).await?;
            let status = client.metadata_status().await?;
            println!("{}", serde_json::to_string(&status)?);
            Ok(())
        }
    }
}

async fn migrate(db: &DatabaseConnection) -> Result<()> {
    db::migrate(db).await.context("applying migrations")
}

fn build_state(config: AppConfig, db: DatabaseConnection) -> Result<AppState> {
    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key not present in configuration")?;
    let crypto_key = CryptoKey::new(key_bytes).context("initializing crypto key")?;

    let embeddings: Arc<dyn EmbeddingProvider> =
        Arc::new(OpenAiEmbeddings::new(&config.embedding).context("building embedding client")?);
    let factory = Arc::new(DefaultAdapterFactory::new(&config, embeddings.clone()));

    Ok(AppState::new(config, db, crypto_key, embeddings, factory))
}

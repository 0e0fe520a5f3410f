//! Metadata store connection.
//!
//! Connections, table configurations and run history live in a SeaORM
//! database (Postgres in production, SQLite in tests). This module opens it,
//! brings its schema up to date and answers `/healthz`.

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum MetadataStoreError {
    #[error("metadata database URL is empty")]
    MissingUrl,
    #[error("metadata database unreachable after {attempts} attempts: {source}")]
    Unreachable { attempts: u32, source: DbErr },
    #[error("applying metadata migrations failed: {0}")]
    Migration(DbErr),
}

/// Open the metadata pool, retrying with doubling delays.
///
/// ```no_run
/// use pds_sync::{config::AppConfig, db};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = db::connect(&AppConfig::default()).await?;
///     db::migrate(&store).await?;
///     Ok(())
/// }
/// ```
pub async fn connect(cfg: &AppConfig) -> Result<DatabaseConnection, MetadataStoreError> {
    if cfg.database_url.trim().is_empty() {
        return Err(MetadataStoreError::MissingUrl);
    }

    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut delay = FIRST_RETRY_DELAY;
    let mut attempt = 1;
    loop {
        match Database::connect(options.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, backend = ?conn.get_database_backend(), "Metadata store connected");
                return Ok(conn);
            }
            Err(source) if attempt == CONNECT_ATTEMPTS => {
                tracing::error!(attempts = attempt, error = %source, "Metadata store unreachable");
                return Err(MetadataStoreError::Unreachable {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, retry_in = ?delay, "Metadata store connect failed");
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Apply every pending migration.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), MetadataStoreError> {
    Migrator::up(db, None)
        .await
        .map_err(MetadataStoreError::Migration)?;
    tracing::info!("Metadata migrations applied");
    Ok(())
}

/// Run `SELECT 1` against the store.
pub async fn ping(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.query_one(Statement::from_string(
        db.get_database_backend(),
        "SELECT 1".to_string(),
    ))
    .await?;
    Ok(())
}

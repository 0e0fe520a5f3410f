//! Test utilities for database and pipeline testing.
//!
//! In-memory SQLite databases with migrations applied, connection and table
//! configuration fixtures, and an adapter factory that writes relational
//! rows into a SQLite database instead of Postgres.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use pds_sync::config::AppConfig;
use pds_sync::connectors::credentials::ConnectionCredentials;
use pds_sync::connectors::embeddings::EmbeddingProvider;
use pds_sync::connectors::vector_store::QdrantClient;
use pds_sync::crypto::CryptoKey;
use pds_sync::destinations::{
    AdapterFactory, DestinationAdapter, DestinationKind, RelationalAdapter, VectorAdapter,
};
use pds_sync::error::SyncError;
use pds_sync::models::connection::{ConnectionKind, Direction};
use pds_sync::repositories::connection::NewConnection;
use pds_sync::repositories::table_config::{ColumnDraft, NewTableConfig};
use pds_sync::repositories::{ConnectionRepository, TableConfigRepository};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub const TEST_KEY: [u8; 32] = [7u8; 32];

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn crypto_key() -> CryptoKey {
    CryptoKey::new(TEST_KEY.to_vec()).expect("32-byte key")
}

/// Configuration with no delay between pages
pub fn test_config() -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(TEST_KEY.to_vec()),
        ..Default::default()
    };
    config.sync.page_delay_ms = 0;
    config
}

pub async fn create_pds_connection(db: &Arc<DatabaseConnection>, url: &str) -> Result<Uuid> {
    let repo = ConnectionRepository::new(db.clone(), crypto_key());
    let model = repo
        .create(NewConnection {
            name: format!("pds-{}", Uuid::new_v4().simple()),
            description: None,
            kind: ConnectionKind::Pds,
            direction: Direction::Source,
            credentials: json!({"url": url, "username": "sync", "password": "secret"}),
        })
        .await?;
    Ok(model.id)
}

pub async fn create_relational_connection(db: &Arc<DatabaseConnection>) -> Result<Uuid> {
    let repo = ConnectionRepository::new(db.clone(), crypto_key());
    let model = repo
        .create(NewConnection {
            name: format!("warehouse-{}", Uuid::new_v4().simple()),
            description: Some("test warehouse".to_string()),
            kind: ConnectionKind::Relational,
            direction: Direction::Destination,
            credentials: json!({
                "host": "localhost", "port": 5432, "database": "dw",
                "username": "writer", "password": "secret"
            }),
        })
        .await?;
    Ok(model.id)
}

/// Vector store connection pointing at a mock server URI such as `http://127.0.0.1:4000`
pub async fn create_vector_connection(db: &Arc<DatabaseConnection>, uri: &str) -> Result<Uuid> {
    let url = url::Url::parse(uri)?;
    let repo = ConnectionRepository::new(db.clone(), crypto_key());
    let model = repo
        .create(NewConnection {
            name: format!("qdrant-{}", Uuid::new_v4().simple()),
            description: None,
            kind: ConnectionKind::VectorStore,
            direction: Direction::Destination,
            credentials: json!({
                "host": url.host_str().unwrap_or("127.0.0.1"),
                "port": url.port().unwrap_or(80),
            }),
        })
        .await?;
    Ok(model.id)
}

/// Column fixture: (name, data type, primary key)
pub type ColumnFixture<'a> = (&'a str, &'a str, bool);

pub async fn create_table_config(
    db: &Arc<DatabaseConnection>,
    source: Uuid,
    destination: Uuid,
    table_name: &str,
    page_size: i32,
    batch_size: i32,
    columns: &[ColumnFixture<'_>],
) -> Result<Uuid> {
    let repo = TableConfigRepository::new(db.clone());
    let config = repo
        .create(NewTableConfig {
            config_name: format!("{}-{}", table_name.to_lowercase(), Uuid::new_v4().simple()),
            table_name: table_name.to_string(),
            title: None,
            source_connection_id: source,
            destination_connection_id: destination,
            page_size: Some(page_size),
            batch_size: Some(batch_size),
            active: Some(true),
        })
        .await?;

    let drafts = columns
        .iter()
        .map(|(name, data_type, pk)| ColumnDraft {
            column_name: name.to_string(),
            data_type: Some(data_type.to_string()),
            active: Some(true),
            is_primary_key: Some(*pk),
        })
        .collect::<Vec<_>>();
    if !drafts.is_empty() {
        repo.upsert_columns(config.id, drafts).await?;
    }
    Ok(config.id)
}

/// Embedding provider returning constant vectors and counting calls
#[derive(Default)]
pub struct CountingEmbeddings {
    pub calls: AtomicUsize,
    pub inputs: AtomicUsize,
    pub largest_call: AtomicUsize,
    /// When set, every call fails with this message
    pub failure: Option<String>,
}

impl CountingEmbeddings {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> usize {
        self.inputs.load(Ordering::SeqCst)
    }

    /// Most inputs seen in a single call
    pub fn largest_call(&self) -> usize {
        self.largest_call.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbeddings {
    fn dimension(&self) -> usize {
        4
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.fetch_add(inputs.len(), Ordering::SeqCst);
        self.largest_call.fetch_max(inputs.len(), Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SyncError::EmbeddingProvider(message.clone()));
        }
        Ok(inputs.iter().map(|_| vec![0.5; 4]).collect())
    }
}

/// Routes relational destinations to a SQLite database and vector
/// destinations to whatever host the connection names.
pub struct TestAdapterFactory {
    pub destination_db: DatabaseConnection,
    pub embeddings: Arc<dyn EmbeddingProvider>,
}

#[async_trait]
impl AdapterFactory for TestAdapterFactory {
    async fn build(
        &self,
        kind: DestinationKind,
        credentials: &ConnectionCredentials,
    ) -> Result<Box<dyn DestinationAdapter>, SyncError> {
        match (kind, credentials) {
            (DestinationKind::Relational, ConnectionCredentials::Relational(_)) => {
                Ok(Box::new(RelationalAdapter::new(self.destination_db.clone())))
            }
            (DestinationKind::Vector, ConnectionCredentials::VectorStore(creds)) => {
                let client = QdrantClient::new(creds, Duration::from_secs(5))
                    .map_err(|e| SyncError::Configuration(e.to_string()))?;
                Ok(Box::new(VectorAdapter::new(client, self.embeddings.clone())))
            }
            _ => Err(SyncError::Configuration("unexpected destination".to_string())),
        }
    }
}

//! Destination adapters
//!
//! A sync writes into exactly one destination. [`DestinationAdapter`] is the
//! seam between the orchestrator and the two supported strategies:
//! relational upserts with dynamic DDL, and embedding plus vector upsert.

pub mod relational;
pub mod vector;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::connectors::credentials::ConnectionCredentials;
use crate::connectors::embeddings::EmbeddingProvider;
use crate::connectors::remote_query::Record;
use crate::connectors::vector_store::QdrantClient;
use crate::error::SyncError;
use crate::models::connection::ConnectionKind;
use crate::models::table_column;

pub use relational::RelationalAdapter;
pub use vector::VectorAdapter;

/// Closed set of destination strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Relational,
    Vector,
}

impl DestinationKind {
    /// Strategy for a destination connection kind
    pub fn for_connection(kind: ConnectionKind) -> Result<Self, SyncError> {
        match kind {
            ConnectionKind::Relational => Ok(DestinationKind::Relational),
            ConnectionKind::VectorStore => Ok(DestinationKind::Vector),
            ConnectionKind::Pds => Err(SyncError::UnsupportedDestination(
                "pds connections can only be used as a source".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Relational => "relational",
            DestinationKind::Vector => "vector",
        }
    }
}

/// Declared column as seen by a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub is_primary_key: bool,
}

impl From<&table_column::Model> for ColumnSpec {
    fn from(column: &table_column::Model) -> Self {
        Self {
            name: column.column_name.clone(),
            data_type: column.data_type.clone(),
            is_primary_key: column.is_primary_key,
        }
    }
}

/// Destination-side view of a table configuration; only active columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn primary_keys(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }
}

/// A row the destination refused, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SkippedRow {
    #[schema(value_type = Object)]
    pub row: Record,
    pub reason: String,
}

/// Result of applying one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub creates: u64,
    pub updates: u64,
    pub skipped: Vec<SkippedRow>,
}

impl BatchOutcome {
    pub fn absorb(&mut self, other: BatchOutcome) {
        self.creates += other.creates;
        self.updates += other.updates;
        self.skipped.extend(other.skipped);
    }
}

/// Writes batches of source records into one destination
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    fn kind(&self) -> DestinationKind;

    /// Makes sure the destination can accept rows for `table`; idempotent
    async fn prepare(&self, table: &TableSpec) -> Result<(), SyncError>;

    async fn apply_batch(
        &self,
        table: &TableSpec,
        rows: &[Record],
    ) -> Result<BatchOutcome, SyncError>;
}

/// Builds the adapter for a resolved destination connection
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn build(
        &self,
        kind: DestinationKind,
        credentials: &ConnectionCredentials,
    ) -> Result<Box<dyn DestinationAdapter>, SyncError>;
}

/// Production factory: Postgres-protocol relational targets and Qdrant
pub struct DefaultAdapterFactory {
    embeddings: Arc<dyn EmbeddingProvider>,
    vector_timeout: Duration,
}

impl DefaultAdapterFactory {
    pub fn new(config: &AppConfig, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            vector_timeout: config.sync.vector_timeout(),
        }
    }
}

#[async_trait]
impl AdapterFactory for DefaultAdapterFactory {
    async fn build(
        &self,
        kind: DestinationKind,
        credentials: &ConnectionCredentials,
    ) -> Result<Box<dyn DestinationAdapter>, SyncError> {
        match (kind, credentials) {
            (DestinationKind::Relational, ConnectionCredentials::Relational(creds)) => {
                Ok(Box::new(RelationalAdapter::connect(creds).await?))
            }
            (DestinationKind::Vector, ConnectionCredentials::VectorStore(creds)) => {
                let client = QdrantClient::new(creds, self.vector_timeout)
                    .map_err(|e| SyncError::Configuration(e.to_string()))?;
                Ok(Box::new(VectorAdapter::new(client, self.embeddings.clone())))
            }
            (kind, other) => Err(SyncError::Configuration(format!(
                "{} destination cannot use {:?} credentials",
                kind.as_str(),
                other.kind()
            ))),
        }
    }
}

/// Text form of a JSON value; `None` for null
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Text form of a record field; `None` for missing, null or blank values
pub fn non_empty_text(row: &Record, column: &str) -> Option<String> {
    row.get(column)
        .and_then(value_text)
        .filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pds_is_not_a_destination() {
        assert!(matches!(
            DestinationKind::for_connection(ConnectionKind::Pds),
            Err(SyncError::UnsupportedDestination(_))
        ));
        assert_eq!(
            DestinationKind::for_connection(ConnectionKind::VectorStore).unwrap(),
            DestinationKind::Vector
        );
    }

    #[test]
    fn value_text_keeps_falsy_scalars() {
        let row: Record = json!({"a": 0, "b": false, "c": "  ", "d": null, "e": [1]})
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(non_empty_text(&row, "a").as_deref(), Some("0"));
        assert_eq!(non_empty_text(&row, "b").as_deref(), Some("false"));
        assert_eq!(non_empty_text(&row, "c"), None);
        assert_eq!(non_empty_text(&row, "d"), None);
        assert_eq!(non_empty_text(&row, "e").as_deref(), Some("[1]"));
        assert_eq!(non_empty_text(&row, "missing"), None);
    }
}

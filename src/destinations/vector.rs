//! Vector destination
//!
//! Each record becomes one point. The point id is derived from the declared
//! primary-key values so re-running a sync replaces points instead of
//! duplicating them; tables without usable keys fall back to random ids.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    BatchOutcome, DestinationAdapter, DestinationKind, SkippedRow, TableSpec, non_empty_text,
    value_text,
};
use crate::connectors::embeddings::EmbeddingProvider;
use crate::connectors::remote_query::Record;
use crate::connectors::vector_store::{Point, QdrantClient};
use crate::error::SyncError;

/// Identity of one record in the vector store
#[derive(Debug, Clone, PartialEq)]
pub struct PointIdentity {
    pub id: Uuid,
    pub source_id: String,
    pub source_pk: Map<String, Value>,
}

/// Collection a table is synced into
pub fn collection_name(table_name: &str) -> String {
    table_name.to_lowercase()
}

/// Derives the point identity of `row`.
///
/// Key columns are taken in declaration order and null values are left
/// out. The id is a UUIDv5 in the DNS namespace over
/// `table:col:val[:col:val...]`.
pub fn point_identity(table: &TableSpec, row: &Record) -> PointIdentity {
    let mut parts = Vec::new();
    let mut source_pk = Map::new();
    for column in table.primary_keys().map(|c| c.name.as_str()) {
        if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
            let text = value_text(value).unwrap_or_default();
            parts.push(format!("{}:{}", column, text));
            source_pk.insert(column.to_string(), value.clone());
        }
    }

    if parts.is_empty() {
        let id = Uuid::new_v4();
        return PointIdentity {
            id,
            source_id: id.to_string(),
            source_pk,
        };
    }

    let name = format!("{}:{}", table.table_name, parts.join(":"));
    PointIdentity {
        id: Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()),
        source_id: parts.join("_"),
        source_pk,
    }
}

/// Text sent to the embedding provider for `row`
pub fn embedding_text(table: &TableSpec, row: &Record) -> String {
    table
        .columns
        .iter()
        .filter_map(|c| non_empty_text(row, &c.name).map(|value| format!("{}: {}", c.name, value)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Vector destination backed by Qdrant and an embedding provider
pub struct VectorAdapter {
    client: QdrantClient,
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl VectorAdapter {
    pub fn new(client: QdrantClient, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { client, embeddings }
    }
}

#[async_trait]
impl DestinationAdapter for VectorAdapter {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Vector
    }

    #[instrument(skip(self, table), fields(table = %table.table_name))]
    async fn prepare(&self, table: &TableSpec) -> Result<(), SyncError> {
        let collection = collection_name(&table.table_name);
        self.client
            .ensure_collection(&collection, self.embeddings.dimension())
            .await
            .map_err(|e| {
                SyncError::Schema(format!("cannot create collection '{}': {}", collection, e))
            })
    }

    async fn apply_batch(
        &self,
        table: &TableSpec,
        rows: &[Record],
    ) -> Result<BatchOutcome, SyncError> {
        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let collection = collection_name(&table.table_name);

        // Empty texts are never sent to the provider
        let mut skipped = Vec::new();
        let mut rows_to_embed = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        for row in rows {
            let text = embedding_text(table, row);
            if text.is_empty() {
                skipped.push(SkippedRow {
                    row: row.clone(),
                    reason: "no non-empty values to embed".to_string(),
                });
            } else {
                rows_to_embed.push(row);
                texts.push(text);
            }
        }
        if !skipped.is_empty() {
            warn!(collection = %collection, skipped = skipped.len(), "Rows without embeddable text");
        }
        if rows_to_embed.is_empty() {
            return Ok(BatchOutcome {
                creates: 0,
                updates: 0,
                skipped,
            });
        }

        let identities: Vec<PointIdentity> = rows_to_embed
            .iter()
            .map(|r| point_identity(table, r))
            .collect();

        let vectors = self.embeddings.embed(&texts).await?;
        if vectors.len() != rows_to_embed.len() {
            return Err(SyncError::EmbeddingProvider(format!(
                "expected {} embeddings, received {}",
                rows_to_embed.len(),
                vectors.len()
            )));
        }

        let ids: Vec<Uuid> = identities.iter().map(|i| i.id).collect();
        if let Err(err) = self.client.delete_points(&collection, &ids).await {
            warn!(collection = %collection, error = %err, "Failed to delete existing points");
        }

        let sync_timestamp = Utc::now().to_rfc3339();
        let points: Vec<Point> = rows_to_embed
            .iter()
            .zip(identities)
            .zip(texts)
            .zip(vectors)
            .map(|(((row, identity), text), vector)| Point {
                id: identity.id,
                vector,
                payload: json!({
                    "table_name": table.table_name,
                    "original_data": row,
                    "text": text,
                    "source_id": identity.source_id,
                    "source_pk": identity.source_pk,
                    "sync_timestamp": sync_timestamp,
                }),
            })
            .collect();

        self.client
            .upsert_points(&collection, &points)
            .await
            .map_err(|e| SyncError::Upsert(e.to_string()))?;

        debug!(collection = %collection, points = points.len(), "Vector batch upserted");
        Ok(BatchOutcome {
            creates: points.len() as u64,
            updates: 0,
            skipped,
        })
    }
}

//! Qdrant REST client
//!
//! A thin typed wrapper over the handful of Qdrant endpoints the console
//! uses: collection management, point upsert and delete, scroll and search.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use super::credentials::VectorStoreCredentials;

/// Errors returned by the vector store
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store unreachable: {0}")]
    Transport(String),
    #[error("vector store returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected vector store response: {0}")]
    Decode(String),
    #[error("invalid vector store URL: {0}")]
    Url(#[from] url::ParseError),
}

impl VectorStoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            VectorStoreError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Point written to a collection
#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// Collection summary
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollectionInfo {
    pub name: String,
    /// Optimizer status reported by the store (`green`, `yellow`, ...)
    pub status: Option<String>,
    pub points_count: Option<u64>,
    pub vector_size: Option<u64>,
}

/// One page of a scroll
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScrollPage {
    pub points: Vec<Value>,
    /// Offset to pass to fetch the next page; absent at the end
    pub next_page_offset: Option<Value>,
}

/// Search hit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    collections: Vec<CollectionName>,
}

#[derive(Debug, Deserialize)]
struct CollectionName {
    name: String,
}

/// HTTP client for one Qdrant connection
#[derive(Debug, Clone)]
pub struct QdrantClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl QdrantClient {
    pub fn new(
        credentials: &VectorStoreCredentials,
        timeout: Duration,
    ) -> Result<Self, VectorStoreError> {
        let base_url = credentials
            .base_url()
            .map_err(|e| VectorStoreError::Transport(e.to_string()))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VectorStoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            api_key: credentials.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, VectorStoreError> {
        let url = self.base_url.join(path)?;
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), VectorStoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| VectorStoreError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VectorStoreError::Transport(e.to_string()))?;
        Ok((status, body))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, VectorStoreError> {
        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str::<Envelope<T>>(&body)
            .map(|envelope| envelope.result)
            .map_err(|e| VectorStoreError::Decode(e.to_string()))
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let list: CollectionList = self.call(self.request(Method::GET, "collections")?).await?;
        let mut names: Vec<String> = list.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    /// Collection details, or `None` when it does not exist
    pub async fn collection_info(
        &self,
        name: &str,
    ) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let builder = self.request(Method::GET, &collection_path(name, ""))?;
        let (status, body) = self.send(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<Value> =
            serde_json::from_str(&body).map_err(|e| VectorStoreError::Decode(e.to_string()))?;
        let result = envelope.result;
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            status: result["status"].as_str().map(str::to_string),
            points_count: result["points_count"].as_u64(),
            vector_size: result["config"]["params"]["vectors"]["size"].as_u64(),
        }))
    }

    /// Creates a cosine-distance collection; an existing collection is not an error
    pub async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        let body = json!({
            "vectors": {"size": dimension, "distance": "Cosine"},
            "hnsw_config": {"m": 16, "ef_construct": 100},
            "optimizers_config": {"memmap_threshold": 20000}
        });
        let builder = self
            .request(Method::PUT, &collection_path(name, ""))?
            .json(&body);
        let (status, text) = self.send(builder).await?;

        if status.is_success() {
            info!(collection = name, dimension, "Created vector collection");
            return Ok(());
        }
        if status == StatusCode::CONFLICT || text.contains("already exists") {
            debug!(collection = name, "Collection already exists");
            return Ok(());
        }
        Err(VectorStoreError::Api {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Creates the collection unless it already exists
    pub async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        if self.collection_info(name).await?.is_some() {
            return Ok(());
        }
        self.create_collection(name, dimension).await
    }

    /// Drops a collection; `false` when it did not exist
    pub async fn delete_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        let builder = self.request(Method::DELETE, &collection_path(name, ""))?;
        let (status, body) = self.send(builder).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(VectorStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str::<Envelope<bool>>(&body)
            .map(|envelope| envelope.result)
            .map_err(|e| VectorStoreError::Decode(e.to_string()))
    }

    /// Upserts points and waits for them to be applied
    pub async fn upsert_points(
        &self,
        name: &str,
        points: &[Point],
    ) -> Result<(), VectorStoreError> {
        let builder = self
            .request(Method::PUT, &collection_path(name, "/points?wait=true"))?
            .json(&json!({ "points": points }));
        let _: Value = self.call(builder).await?;
        Ok(())
    }

    pub async fn delete_points(&self, name: &str, ids: &[Uuid]) -> Result<(), VectorStoreError> {
        let builder = self
            .request(
                Method::POST,
                &collection_path(name, "/points/delete?wait=true"),
            )?
            .json(&json!({ "points": ids }));
        let _: Value = self.call(builder).await?;
        Ok(())
    }

    pub async fn scroll(
        &self,
        name: &str,
        limit: u32,
        offset: Option<Value>,
    ) -> Result<ScrollPage, VectorStoreError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = offset;
        }
        let builder = self
            .request(Method::POST, &collection_path(name, "/points/scroll"))?
            .json(&body);
        self.call(builder).await
    }

    pub async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: u32,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let builder = self
            .request(Method::POST, &collection_path(name, "/points/search"))?
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }));
        self.call(builder).await
    }
}

fn collection_path(name: &str, suffix: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("collections/{}{}", encoded, suffix)
}

//! Embedding provider seam
//!
//! The vector destination only needs "texts in, vectors out". The default
//! implementation speaks the OpenAI-compatible `/embeddings` API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::SyncError;

/// Produces one embedding vector per input text, in input order
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SyncError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible embedding client
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, SyncError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.http.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(count = inputs.len(), model = %self.model, "Requesting embeddings");
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::EmbeddingProvider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::EmbeddingProvider(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SyncError::EmbeddingProvider(format!("malformed response: {}", e)))?;

        if parsed.data.len() != inputs.len() {
            return Err(SyncError::EmbeddingProvider(format!(
                "expected {} embeddings, received {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|datum| datum.index);
        parsed
            .data
            .into_iter()
            .map(|datum| {
                if datum.embedding.len() == self.dimension {
                    Ok(datum.embedding)
                } else {
                    Err(SyncError::EmbeddingProvider(format!(
                        "embedding {} has dimension {}, expected {}",
                        datum.index,
                        datum.embedding.len(),
                        self.dimension
                    )))
                }
            })
            .collect()
    }
}

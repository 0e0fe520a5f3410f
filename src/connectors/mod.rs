//! Connectors to the external systems a sync touches
//!
//! - [`credentials`]: per-kind typed credentials stored on connections
//! - [`remote_query`]: the PDS data service (source)
//! - [`embeddings`]: the embedding provider used by vector syncs
//! - [`vector_store`]: the Qdrant REST API (destination)

pub mod credentials;
pub mod embeddings;
pub mod remote_query;
pub mod vector_store;

pub use credentials::{
    ConnectionCredentials, CredentialsError, PdsCredentials, RelationalCredentials,
    VectorStoreCredentials,
};
pub use embeddings::{EmbeddingProvider, OpenAiEmbeddings};
pub use remote_query::{MetadataStatus, PageResult, PdsClient, QueryPayload, Record};
pub use vector_store::{QdrantClient, VectorStoreError};

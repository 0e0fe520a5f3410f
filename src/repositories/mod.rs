//! # Repository Layer
//!
//! Repository implementations wrapping SeaORM operations for connections,
//! table configurations with their columns, and the sync run ledger.

pub mod connection;
pub mod sync_run;
pub mod table_config;

pub use connection::ConnectionRepository;
pub use sync_run::SyncRunRepository;
pub use table_config::TableConfigRepository;

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::connectors::credentials::CredentialsError;
use crate::crypto::CryptoError;
use crate::error::{ApiError, validation_error};

/// Errors surfaced by repositories when a write is rejected or a lookup misses
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl RepositoryError {
    pub(crate) fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", &error.to_string())
            }
            RepositoryError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", &message)
            }
            RepositoryError::Validation { field, message } => {
                validation_error(&message, json!({ field: message.clone() }))
            }
            RepositoryError::Credentials(err) => {
                validation_error(&err.to_string(), json!({ "credentials": err.to_string() }))
            }
            RepositoryError::Crypto(err) => {
                tracing::error!(error = %err, "Stored credentials could not be decrypted");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Stored credentials could not be decrypted",
                )
            }
            RepositoryError::Database(err) => err.into(),
        }
    }
}

//! # Error Handling
//!
//! Unified error handling for the sync console API: a problem+json response
//! body with trace id propagation, plus the [`SyncError`] taxonomy produced by
//! the sync pipeline and its mapping onto HTTP statuses.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Maximum characters of an upstream body kept in error details
const BODY_SNIPPET_CHARS: usize = 200;

/// Maximum characters of an upstream body kept inside a [`SyncError`]
const STORED_BODY_CHARS: usize = 2000;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the current request, or a short generated correlation id
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Unprocessable Entity")]
    UnprocessableEntity,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Error code string for this error type (SCREAMING_SNAKE_CASE)
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::UnprocessableEntity => "SYNC_CONFIGURATION",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "UPSTREAM_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Upstream service error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpstreamError {
    /// Upstream system (`pds`, `vector_store`, `embedding`)
    pub upstream: String,
    /// HTTP status code from upstream, when one was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Errors raised by the sync pipeline and its collaborators.
///
/// Every fatal variant is written to the run ledger before it is returned.
/// Per-row relational failures are never represented here; they are reported
/// as skipped rows in the batch outcome.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("remote service returned HTTP {status}: {body}")]
    RemoteApi { status: u16, body: String },
    #[error("destination schema error: {0}")]
    Schema(String),
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),
    #[error("vector upsert failed: {0}")]
    Upsert(String),
    #[error("unsupported destination: {0}")]
    UnsupportedDestination(String),
    #[error("a sync for table configuration {0} is already running")]
    AlreadyRunning(Uuid),
    #[error("sync cancelled")]
    Cancelled,
    #[error("sync timed out after {0} s")]
    TimedOut(u64),
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl SyncError {
    /// Build a [`SyncError::RemoteApi`], bounding the stored body
    pub fn remote_api(status: u16, body: impl AsRef<str>) -> Self {
        Self::RemoteApi {
            status,
            body: truncate_chars(body.as_ref(), STORED_BODY_CHARS),
        }
    }

    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Configuration(_) => "configuration",
            SyncError::RemoteUnavailable(_) => "remote_unavailable",
            SyncError::RemoteApi { .. } => "remote_api",
            SyncError::Schema(_) => "schema",
            SyncError::EmbeddingProvider(_) => "embedding_provider",
            SyncError::Upsert(_) => "upsert",
            SyncError::UnsupportedDestination(_) => "unsupported_destination",
            SyncError::AlreadyRunning(_) => "already_running",
            SyncError::Cancelled => "cancelled",
            SyncError::TimedOut(_) => "timed_out",
            SyncError::Ledger(_) => "ledger",
        }
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(error: sea_orm::DbErr) -> Self {
        SyncError::Ledger(error.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        let message = error.to_string();
        match &error {
            SyncError::Configuration(_) | SyncError::UnsupportedDestination(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "SYNC_CONFIGURATION", &message)
            }
            SyncError::RemoteApi { status, body } => {
                upstream_error("pds", Some(*status), Some(body.as_str()), &message)
            }
            SyncError::RemoteUnavailable(detail) => {
                upstream_error("pds", None, Some(detail.as_str()), &message)
            }
            SyncError::EmbeddingProvider(detail) => {
                upstream_error("embedding", None, Some(detail.as_str()), &message)
            }
            SyncError::Upsert(detail) => {
                upstream_error("vector_store", None, Some(detail.as_str()), &message)
            }
            SyncError::Schema(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "DESTINATION_SCHEMA", &message)
            }
            SyncError::AlreadyRunning(_) => {
                ApiError::new(StatusCode::CONFLICT, "SYNC_IN_PROGRESS", &message)
            }
            SyncError::Cancelled | SyncError::TimedOut(_) => {
                ApiError::new(StatusCode::GATEWAY_TIMEOUT, "SYNC_ABORTED", &message)
            }
            SyncError::Ledger(_) => {
                tracing::error!(error = %message, "Sync ledger failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to record sync run",
                )
            }
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let truncated: String = value.chars().take(max).collect();
        format!("{}...", truncated)
    } else {
        value.to_string()
    }
}

/// Create an upstream failure error (502) with a truncated body snippet
pub fn upstream_error(
    upstream: &str,
    status: Option<u16>,
    body: Option<&str>,
    message: &str,
) -> ApiError {
    let details = UpstreamError {
        upstream: upstream.to_string(),
        status,
        body_snippet: body.map(|b| truncate_chars(b, BODY_SNIPPET_CHARS)),
    };

    ApiError::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", message).with_details(json!(details))
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Create a not found error naming the missing resource
pub fn not_found(resource: &str, id: impl std::fmt::Display) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("{} {} not found", resource, id),
    )
}

/// Create a conflict error (409)
pub fn conflict(message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
}

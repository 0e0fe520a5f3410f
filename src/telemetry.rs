//! Log output and per-request trace ids.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use tokio::task_local;
use tracing::{Instrument, subscriber::SetGlobalDefaultError};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::Layer, layer::SubscriberExt};

use crate::config::AppConfig;

/// Accepted inbound and echoed on every response.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

const MAX_TRACE_ID_LEN: usize = 128;

task_local! {
    static TRACE_ID: String;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

fn output_layer(format: &str) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().with_current_span(true).boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
///
/// sqlx and reqwest log through the `log` facade; those records are bridged
/// so sync runs and SQL statements land in one stream.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    LogTracer::init()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = Registry::default()
        .with(output_layer(&config.log_format))
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Trace id of the request the current task is serving.
pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(String::clone).ok()
}

fn inbound_trace_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get(&TRACE_ID_HEADER)?
        .to_str()
        .ok()
        .filter(|value| !value.is_empty() && value.len() <= MAX_TRACE_ID_LEN)
        .map(str::to_string)
}

/// Tags each request with a trace id: the caller's `x-trace-id` when it is
/// short printable ASCII, else a fresh UUID.
pub async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id =
        inbound_trace_id(&request).unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = TRACE_ID
        .scope(trace_id.clone(), next.run(request).instrument(span))
        .await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

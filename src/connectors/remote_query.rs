//! PDS data service client
//!
//! Builds `runquery` payloads, pages through results and drives the metadata
//! refresh endpoints. Every failure is translated into a [`SyncError`]:
//! transport problems become `RemoteUnavailable`, anything the service
//! answered with becomes `RemoteApi`.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::credentials::PdsCredentials;
use crate::error::SyncError;

/// Configuration code every endpoint is scoped to
pub const CONFIG_CODE: &str = "ds_unifier";
/// Prefix the service expects on table names
pub const TABLE_PREFIX: &str = "UNIFIER_";

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_SUCCESS: &str = "Metadata Seeding Status : SUCCESS";
const STATUS_PENDING: &str = "Metadata Seeding Status : PENDING";
const END_OF_TABLES: &str = "-1";

/// One source record, column name to JSON value
pub type Record = Map<String, Value>;

/// Table entry of a query payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryTable {
    #[schema(example = "UNIFIER_CUSTOMERS")]
    pub table_name: String,
    pub columns: Vec<String>,
}

/// Body sent to the `runquery` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    /// Logical table name
    pub name: String,
    /// Page size, sent as a string
    #[schema(example = "1000")]
    pub page_size: String,
    pub tables: Vec<QueryTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_key: Option<i64>,
}

/// Prepends [`TABLE_PREFIX`] unless the name already carries it
pub fn canonical_table_name(table_name: &str) -> String {
    if table_name.starts_with(TABLE_PREFIX) {
        table_name.to_string()
    } else {
        format!("{}{}", TABLE_PREFIX, table_name)
    }
}

/// Builds the query payload for one page
pub fn build_payload(
    table_name: &str,
    page_size: i32,
    columns: &[String],
    next_key: Option<i64>,
) -> QueryPayload {
    QueryPayload {
        name: table_name.to_string(),
        page_size: page_size.to_string(),
        tables: vec![QueryTable {
            table_name: canonical_table_name(table_name),
            columns: columns.to_vec(),
        }],
        next_key,
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub items: Vec<Record>,
    /// Continuation key; `None` when this was the last page
    pub next_key: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    pagination: Option<Vec<Pagination>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    next_key: Option<Value>,
    #[serde(default)]
    next_table_name: Option<Value>,
}

impl Pagination {
    /// Continuation key, or `None` when `nextKey == 0` or `nextTableName == "-1"`
    fn continuation(&self) -> Option<i64> {
        let key = self.next_key.as_ref().map_or(0, value_as_i64);
        let table = match &self.next_table_name {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => END_OF_TABLES.to_string(),
            Some(other) => other.to_string(),
        };
        (key != 0 && table != END_OF_TABLES).then_some(key)
    }
}

fn value_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Outcome of a metadata status probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataStatus {
    Success,
    Pending,
    Unknown,
    Error,
}

impl MetadataStatus {
    /// Interprets the plain-text body of the seed status endpoint
    pub fn from_status_text(text: &str) -> Self {
        if text.contains(STATUS_SUCCESS) {
            MetadataStatus::Success
        } else if text.contains(STATUS_PENDING) {
            MetadataStatus::Pending
        } else {
            MetadataStatus::Unknown
        }
    }
}

/// HTTP client for one PDS connection
#[derive(Debug, Clone)]
pub struct PdsClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl PdsClient {
    pub fn new(credentials: &PdsCredentials, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: credentials.base_url().to_string(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            timeout,
        })
    }

    fn query_url(&self) -> String {
        format!(
            "{}/rest-service/dataservice/runquery?configCode={}",
            self.base_url, CONFIG_CODE
        )
    }

    fn refresh_url(&self) -> String {
        format!(
            "{}/rest-service/dataservice/metadata/refresh?configCode={}",
            self.base_url, CONFIG_CODE
        )
    }

    fn status_url(&self) -> String {
        format!(
            "{}/rest-service/v1/config/status/seed/{}",
            self.base_url, CONFIG_CODE
        )
    }

    /// Fetches one page of `table_name`
    pub async fn fetch_page(
        &self,
        table_name: &str,
        page_size: i32,
        columns: &[String],
        next_key: Option<i64>,
    ) -> Result<PageResult, SyncError> {
        let payload = build_payload(table_name, page_size, columns, next_key);
        debug!(table = table_name, next_key = ?next_key, "Requesting PDS page");

        let response = self
            .http
            .post(self.query_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(SyncError::remote_api(status.as_u16(), body));
        }

        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|_| SyncError::remote_api(status.as_u16(), &body))?;

        let prefixed = canonical_table_name(table_name);
        let data = parsed.data.unwrap_or_default();
        let raw_items = data
            .get(&prefixed)
            .or_else(|| data.get(table_name))
            .cloned()
            .unwrap_or(Value::Null);

        let items = match raw_items {
            Value::Array(values) => values
                .into_iter()
                .filter_map(|value| match value {
                    Value::Object(record) => Some(record),
                    other => {
                        warn!(table = table_name, item = %other, "Ignoring non-object item");
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        let next_key = parsed
            .pagination
            .and_then(|pages| pages.into_iter().next())
            .unwrap_or_default()
            .continuation();

        Ok(PageResult { items, next_key })
    }

    /// Asks the service to reseed its metadata; 200 and 202 are accepted
    pub async fn refresh_metadata(&self) -> Result<(), SyncError> {
        let response = self
            .http
            .post(self.refresh_url())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            info!("Metadata refresh accepted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::remote_api(status.as_u16(), body))
    }

    /// Probes the metadata seeding status
    pub async fn metadata_status(&self) -> Result<MetadataStatus, SyncError> {
        let response = self
            .http
            .get(self.status_url())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(SyncError::remote_api(status.as_u16(), body));
        }
        Ok(MetadataStatus::from_status_text(body.trim()))
    }

    /// Triggers a refresh and polls until it reports success or `attempts` run out.
    ///
    /// Returns the last observed status; a failed probe ends polling with
    /// [`MetadataStatus::Error`].
    pub async fn refresh_and_wait(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<MetadataStatus, SyncError> {
        self.refresh_metadata().await?;

        let mut last = MetadataStatus::Unknown;
        for attempt in 1..=attempts.max(1) {
            last = match self.metadata_status().await {
                Ok(status) => status,
                Err(err) => {
                    warn!(attempt, error = %err, "Metadata status probe failed");
                    return Ok(MetadataStatus::Error);
                }
            };
            if last != MetadataStatus::Pending {
                break;
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(last)
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::RemoteUnavailable(format!(
                "request timed out after {} s",
                self.timeout.as_secs()
            ))
        } else {
            SyncError::RemoteUnavailable(err.to_string())
        }
    }
}

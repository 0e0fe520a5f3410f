//! Typed connection credentials
//!
//! Each [`ConnectionKind`] has exactly one credentials shape. Payloads are
//! parsed into that shape when a connection is written; unknown or missing
//! fields are rejected instead of being dropped later.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

use crate::models::connection::ConnectionKind;

const REDACTED: &str = "********";

/// Errors produced while parsing or validating credentials
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("invalid {kind} credentials: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {kind} credentials: field '{field}' must not be empty")]
    EmptyField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("invalid {kind} credentials: '{value}' is not a valid URL: {source}")]
    InvalidUrl {
        kind: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to encode credentials: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Credentials for the PDS data service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PdsCredentials {
    /// Base URL of the service, e.g. `https://pds.example.com`
    #[schema(example = "https://pds.example.com")]
    pub url: String,
    pub username: String,
    pub password: String,
}

impl PdsCredentials {
    /// Base URL with trailing slashes removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Credentials for a relational destination (Postgres protocol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RelationalCredentials {
    #[schema(example = "db.internal")]
    pub host: String,
    #[schema(example = 5432)]
    pub port: u16,
    /// Working database; created on first sync when absent
    #[schema(example = "warehouse")]
    pub database: String,
    pub username: String,
    pub password: String,
}

impl RelationalCredentials {
    /// Connection URL for the configured database
    pub fn database_url(&self) -> Result<String, CredentialsError> {
        self.url_for(&self.database)
    }

    /// Connection URL for an arbitrary database on the same server
    pub fn url_for(&self, database: &str) -> Result<String, CredentialsError> {
        let raw = format!("postgres://{}:{}", self.host, self.port);
        let mut url = Url::parse(&raw).map_err(|source| CredentialsError::InvalidUrl {
            kind: "relational",
            value: raw.clone(),
            source,
        })?;
        // set_username/set_password only fail for cannot-be-a-base URLs
        let _ = url.set_username(&self.username);
        let _ = url.set_password(Some(&self.password));
        url.set_path(database);
        Ok(url.to_string())
    }
}

/// Credentials for a Qdrant vector store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VectorStoreCredentials {
    /// Host name, optionally with an `http://` or `https://` scheme
    #[schema(example = "qdrant.internal")]
    pub host: String,
    #[schema(example = 6333)]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl VectorStoreCredentials {
    /// REST base URL of the vector store
    pub fn base_url(&self) -> Result<Url, CredentialsError> {
        let host = self.host.trim_end_matches('/');
        let raw = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        };
        Url::parse(&raw).map_err(|source| CredentialsError::InvalidUrl {
            kind: "vector_store",
            value: raw,
            source,
        })
    }
}

/// Credentials of any supported connection kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCredentials {
    Pds(PdsCredentials),
    Relational(RelationalCredentials),
    VectorStore(VectorStoreCredentials),
}

impl ConnectionCredentials {
    /// Parse and validate a credentials payload for the given kind
    pub fn parse(kind: ConnectionKind, value: Value) -> Result<Self, CredentialsError> {
        let kind_name = kind_name(kind);
        let malformed = |source| CredentialsError::Malformed {
            kind: kind_name,
            source,
        };

        let credentials = match kind {
            ConnectionKind::Pds => Self::Pds(serde_json::from_value(value).map_err(malformed)?),
            ConnectionKind::Relational => {
                Self::Relational(serde_json::from_value(value).map_err(malformed)?)
            }
            ConnectionKind::VectorStore => {
                Self::VectorStore(serde_json::from_value(value).map_err(malformed)?)
            }
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Parse decrypted bytes previously produced by [`Self::to_json_bytes`]
    pub fn from_json_bytes(kind: ConnectionKind, bytes: &[u8]) -> Result<Self, CredentialsError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|source| CredentialsError::Malformed {
                kind: kind_name(kind),
                source,
            })?;
        Self::parse(kind, value)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CredentialsError> {
        match self {
            Self::Pds(c) => serde_json::to_vec(c),
            Self::Relational(c) => serde_json::to_vec(c),
            Self::VectorStore(c) => serde_json::to_vec(c),
        }
        .map_err(CredentialsError::Encode)
    }

    pub fn kind(&self) -> ConnectionKind {
        match self {
            Self::Pds(_) => ConnectionKind::Pds,
            Self::Relational(_) => ConnectionKind::Relational,
            Self::VectorStore(_) => ConnectionKind::VectorStore,
        }
    }

    /// JSON view with secrets masked, safe to return from the API
    pub fn redacted(&self) -> Value {
        match self {
            Self::Pds(c) => json!({
                "url": c.url,
                "username": c.username,
                "password": REDACTED,
            }),
            Self::Relational(c) => json!({
                "host": c.host,
                "port": c.port,
                "database": c.database,
                "username": c.username,
                "password": REDACTED,
            }),
            Self::VectorStore(c) => json!({
                "host": c.host,
                "port": c.port,
                "api_key": c.api_key.as_ref().map(|_| REDACTED),
            }),
        }
    }

    fn validate(&self) -> Result<(), CredentialsError> {
        match self {
            Self::Pds(c) => {
                require("pds", "url", &c.url)?;
                require("pds", "username", &c.username)?;
                Url::parse(c.base_url()).map_err(|source| CredentialsError::InvalidUrl {
                    kind: "pds",
                    value: c.url.clone(),
                    source,
                })?;
            }
            Self::Relational(c) => {
                require("relational", "host", &c.host)?;
                require("relational", "database", &c.database)?;
                require("relational", "username", &c.username)?;
            }
            Self::VectorStore(c) => {
                require("vector_store", "host", &c.host)?;
                c.base_url()?;
            }
        }
        Ok(())
    }
}

fn require(kind: &'static str, field: &'static str, value: &str) -> Result<(), CredentialsError> {
    if value.trim().is_empty() {
        return Err(CredentialsError::EmptyField { kind, field });
    }
    Ok(())
}

fn kind_name(kind: ConnectionKind) -> &'static str {
    match kind {
        ConnectionKind::Pds => "pds",
        ConnectionKind::Relational => "relational",
        ConnectionKind::VectorStore => "vector_store",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind() {
        let pds = ConnectionCredentials::parse(
            ConnectionKind::Pds,
            json!({"url": "https://pds.example.com/", "username": "u", "password": "p"}),
        )
        .unwrap();
        assert_eq!(pds.kind(), ConnectionKind::Pds);

        let relational = ConnectionCredentials::parse(
            ConnectionKind::Relational,
            json!({"host": "db", "port": 5432, "database": "dw", "username": "u", "password": "p"}),
        )
        .unwrap();
        assert_eq!(relational.kind(), ConnectionKind::Relational);

        let vector = ConnectionCredentials::parse(
            ConnectionKind::VectorStore,
            json!({"host": "qdrant", "port": 6333}),
        )
        .unwrap();
        assert_eq!(vector.kind(), ConnectionKind::VectorStore);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ConnectionCredentials::parse(
            ConnectionKind::VectorStore,
            json!({"host": "qdrant", "port": 6333, "password": "nope"}),
        )
        .unwrap_err();
        assert!(matches!(err, CredentialsError::Malformed { .. }));
    }

    #[test]
    fn rejects_missing_fields() {
        let err = ConnectionCredentials::parse(
            ConnectionKind::Relational,
            json!({"host": "db", "port": 5432, "username": "u", "password": "p"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn rejects_blank_required_values() {
        let err = ConnectionCredentials::parse(
            ConnectionKind::Pds,
            json!({"url": "https://pds", "username": "  ", "password": "p"}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CredentialsError::EmptyField {
                field: "username",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unparseable_pds_url() {
        let err = ConnectionCredentials::parse(
            ConnectionKind::Pds,
            json!({"url": "not a url", "username": "u", "password": "p"}),
        )
        .unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidUrl { .. }));
    }

    #[test]
    fn relational_url_escapes_password() {
        let creds = RelationalCredentials {
            host: "db".to_string(),
            port: 5433,
            database: "dw".to_string(),
            username: "sync".to_string(),
            password: "p@ss/word".to_string(),
        };
        let url = creds.database_url().unwrap();
        assert_eq!(url, "postgres://sync:p%40ss%2Fword@db:5433/dw");
        assert!(creds.url_for("postgres").unwrap().ends_with("/postgres"));
    }

    #[test]
    fn vector_base_url_accepts_scheme_or_bare_host() {
        let bare = VectorStoreCredentials {
            host: "qdrant".to_string(),
            port: 6333,
            api_key: None,
        };
        assert_eq!(bare.base_url().unwrap().as_str(), "http://qdrant:6333/");

        let tls = VectorStoreCredentials {
            host: "https://cloud.qdrant.io".to_string(),
            port: 443,
            api_key: Some("k".to_string()),
        };
        assert_eq!(tls.base_url().unwrap().as_str(), "https://cloud.qdrant.io/");
    }

    #[test]
    fn redaction_masks_secrets() {
        let creds = ConnectionCredentials::Pds(PdsCredentials {
            url: "https://pds".to_string(),
            username: "u".to_string(),
            password: "secret".to_string(),
        });
        let view = creds.redacted();
        assert_eq!(view["password"], REDACTED);
        assert!(!view.to_string().contains("secret"));
    }
}

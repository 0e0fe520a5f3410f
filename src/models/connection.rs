//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores typed descriptors for PDS sources and relational or vector
//! store destinations. Credentials are persisted encrypted; see
//! [`crate::crypto`] and [`crate::connectors::credentials`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Connection entity describing one endpoint of a sync
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name, unique across connections
    pub name: String,

    /// Free-form description shown to operators
    pub description: Option<String>,

    /// Which kind of system this connection points at
    pub kind: ConnectionKind,

    /// Whether the connection is read from or written to
    pub direction: Direction,

    /// AES-256-GCM encrypted credentials JSON
    pub credentials_ciphertext: Vec<u8>,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
}

/// Kind of system behind a connection
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// PDS data service (source only)
    #[sea_orm(string_value = "pds")]
    Pds,

    /// Relational database reachable over the Postgres protocol
    #[sea_orm(string_value = "relational")]
    Relational,

    /// Qdrant vector store
    #[sea_orm(string_value = "vector_store")]
    VectorStore,
}

impl ConnectionKind {
    /// Direction a connection of this kind must be declared with
    pub fn required_direction(self) -> Direction {
        match self {
            ConnectionKind::Pds => Direction::Source,
            ConnectionKind::Relational | ConnectionKind::VectorStore => Direction::Destination,
        }
    }
}

/// Direction of data flow for a connection
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[sea_orm(string_value = "source")]
    Source,

    #[sea_orm(string_value = "destination")]
    Destination,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

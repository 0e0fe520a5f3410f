//! Table configuration entity model
//!
//! A table configuration names one remote PDS table, the source connection
//! it is read from, the destination it is written to and the paging knobs
//! used while syncing.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Lower bound for `page_size` and `batch_size`
pub const MIN_PAGE_SIZE: i32 = 1;
/// Upper bound for `page_size` and `batch_size`
pub const MAX_PAGE_SIZE: i32 = 10_000;
/// Page size used when none is supplied
pub const DEFAULT_PAGE_SIZE: i32 = 1000;
/// Vector batch size used when none is supplied
pub const DEFAULT_BATCH_SIZE: i32 = 100;

/// Table configuration entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "table_configs")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Logical configuration name, unique
    pub config_name: String,

    /// Remote table name without the `UNIFIER_` prefix
    pub table_name: String,

    /// Optional display title
    pub title: Option<String>,

    /// Source connection (direction `source`)
    pub source_connection_id: Uuid,

    /// Destination connection (direction `destination`)
    pub destination_connection_id: Uuid,

    /// Rows requested per page from the source API
    pub page_size: i32,

    /// Rows per embedding/upsert cycle for vector destinations
    pub batch_size: i32,

    /// Whether the configuration is enabled
    pub active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::table_column::Entity")]
    Columns,

    #[sea_orm(has_many = "super::sync_run::Entity")]
    SyncRuns,

    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::SourceConnectionId",
        to = "super::connection::Column::Id"
    )]
    SourceConnection,

    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::DestinationConnectionId",
        to = "super::connection::Column::Id"
    )]
    DestinationConnection,
}

impl Related<super::table_column::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Columns.def()
    }
}

impl Related<super::sync_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Sync run entity model
//!
//! One row per orchestrator invocation. Rows are created `IN_PROGRESS` and
//! finished exactly once; see [`crate::repositories::sync_run`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Ledger entry for one sync run
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Unique run identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Table configuration the run belongs to
    pub table_config_id: Uuid,

    /// Lifecycle status
    pub status: SyncStatus,

    /// Timestamp when the run started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the run reached a terminal status
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Number of active columns requested from the source
    pub total_columns: i32,

    /// Rows inserted (relational) or points written (vector)
    pub total_creates: i64,

    /// Rows updated in place (relational only)
    pub total_updates: i64,

    /// Rows skipped by the relational adapter
    pub total_skipped: i64,

    /// Error text for failed runs
    pub error_message: Option<String>,
}

/// Run lifecycle status
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
pub enum SyncStatus {
    #[sea_orm(string_value = "IN_PROGRESS")]
    #[serde(rename = "IN_PROGRESS")]
    InProgress,

    #[sea_orm(string_value = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,

    #[sea_orm(string_value = "FAILED")]
    #[serde(rename = "FAILED")]
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::table_config::Entity",
        from = "Column::TableConfigId",
        to = "super::table_config::Column::Id"
    )]
    TableConfig,
}

impl Related<super::table_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TableConfig.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

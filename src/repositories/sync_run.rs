//! # Sync Run Ledger
//!
//! Durable history of sync runs. A run is opened as `IN_PROGRESS` and closed
//! exactly once: [`SyncRunRepository::finish`] only touches rows that are
//! still in progress, so a second finalization changes nothing and is
//! reported as an error.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult};
use crate::error::SyncError;
use crate::models::sync_run::{ActiveModel, Column, Entity, Model, SyncStatus};

/// Row counts accumulated over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunTotals {
    pub creates: u64,
    pub updates: u64,
    pub skipped: u64,
}

/// Repository for the sync run ledger
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    db: DatabaseConnection,
}

impl SyncRunRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Opens a new run in `IN_PROGRESS`
    pub async fn start(&self, table_config_id: Uuid, total_columns: i32) -> Result<Model, SyncError> {
        let id = Uuid::new_v4();
        let run = ActiveModel {
            id: Set(id),
            table_config_id: Set(table_config_id),
            status: Set(SyncStatus::InProgress),
            started_at: Set(Utc::now().fixed_offset()),
            finished_at: Set(None),
            total_columns: Set(total_columns),
            total_creates: Set(0),
            total_updates: Set(0),
            total_skipped: Set(0),
            error_message: Set(None),
        };
        run.insert(&self.db).await?;

        tracing::info!(
            run_id = %id,
            table_config_id = %table_config_id,
            total_columns,
            "Sync run started"
        );

        // For SQLite, query the record directly since we already know the ID
        Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| SyncError::Ledger(format!("sync run {} not persisted", id)))
    }

    /// Writes the terminal status of a run.
    ///
    /// Fails with [`SyncError::Ledger`] when the run is unknown or already
    /// terminal; the stored row is left untouched in that case.
    pub async fn finish(
        &self,
        run_id: Uuid,
        status: SyncStatus,
        totals: RunTotals,
        error_message: Option<String>,
    ) -> Result<Model, SyncError> {
        if !status.is_terminal() {
            return Err(SyncError::Ledger(format!(
                "cannot finish run {} with non-terminal status {}",
                run_id,
                status.as_str()
            )));
        }

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(
                Column::FinishedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .col_expr(Column::TotalCreates, Expr::value(to_i64(totals.creates)))
            .col_expr(Column::TotalUpdates, Expr::value(to_i64(totals.updates)))
            .col_expr(Column::TotalSkipped, Expr::value(to_i64(totals.skipped)))
            .col_expr(Column::ErrorMessage, Expr::value(error_message))
            .filter(Column::Id.eq(run_id))
            .filter(Column::Status.eq(SyncStatus::InProgress))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(SyncError::Ledger(format!(
                "sync run {} is unknown or already finalized",
                run_id
            )));
        }

        tracing::info!(
            run_id = %run_id,
            status = status.as_str(),
            creates = totals.creates,
            updates = totals.updates,
            skipped = totals.skipped,
            "Sync run finalized"
        );

        Entity::find_by_id(run_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| SyncError::Ledger(format!("sync run {} vanished", run_id)))
    }

    /// Marks runs left `IN_PROGRESS` by a previous process as failed
    pub async fn fail_orphaned(&self) -> RepositoryResult<u64> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncStatus::Failed.as_str()))
            .col_expr(
                Column::FinishedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .col_expr(
                Column::ErrorMessage,
                Expr::value("interrupted: service restarted while the run was in progress"),
            )
            .filter(Column::Status.eq(SyncStatus::InProgress))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::warn!(
                count = result.rows_affected,
                "Marked orphaned sync runs as failed"
            );
        }
        Ok(result.rows_affected)
    }

    pub async fn get(&self, run_id: Uuid) -> RepositoryResult<Model> {
        Entity::find_by_id(run_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("sync run", run_id))
    }

    /// Runs of one table configuration, newest first
    pub async fn list_for_table(&self, table_config_id: Uuid, limit: u64) -> RepositoryResult<Vec<Model>> {
        Ok(Entity::find()
            .filter(Column::TableConfigId.eq(table_config_id))
            .order_by_desc(Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// The most recent run of every table configuration, newest first
    pub async fn latest_per_table(&self) -> RepositoryResult<Vec<Model>> {
        let runs = Entity::find()
            .order_by_desc(Column::StartedAt)
            .all(&self.db)
            .await?;

        let mut seen = HashSet::new();
        Ok(runs
            .into_iter()
            .filter(|run| seen.insert(run.table_config_id))
            .collect())
    }

    /// Deletes a terminal run; an in-progress run cannot be deleted
    pub async fn delete(&self, run_id: Uuid) -> RepositoryResult<()> {
        let run = self.get(run_id).await?;
        if !run.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "sync run {} is still in progress",
                run_id
            )));
        }
        Entity::delete_by_id(run_id).exec(&self.db).await?;
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

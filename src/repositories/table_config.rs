//! Table configuration repository
//!
//! Owns table configurations and their declared columns. Column and table
//! names flow into dynamic DDL on the relational destination, so they are
//! validated as SQL identifiers before they are ever stored.

use chrono::Utc;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{RepositoryError, RepositoryResult};
use crate::models::connection::{self, Direction, Entity as Connection};
use crate::models::table_column::{self, Entity as TableColumn};
use crate::models::table_config::{
    self, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, Entity as TableConfig, MAX_PAGE_SIZE,
    MIN_PAGE_SIZE,
};

const DEFAULT_DATA_TYPE: &str = "string";

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

/// Returns true when `name` is usable as an unquoted-safe SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern"))
        .is_match(name)
}

/// Fields accepted when creating a table configuration
#[derive(Debug, Clone)]
pub struct NewTableConfig {
    pub config_name: String,
    pub table_name: String,
    pub title: Option<String>,
    pub source_connection_id: Uuid,
    pub destination_connection_id: Uuid,
    pub page_size: Option<i32>,
    pub batch_size: Option<i32>,
    pub active: Option<bool>,
}

/// Partial update of a table configuration
#[derive(Debug, Clone, Default)]
pub struct TableConfigChanges {
    pub config_name: Option<String>,
    pub table_name: Option<String>,
    pub title: Option<String>,
    pub source_connection_id: Option<Uuid>,
    pub destination_connection_id: Option<Uuid>,
    pub page_size: Option<i32>,
    pub batch_size: Option<i32>,
    pub active: Option<bool>,
}

/// Column declaration as written by callers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnDraft {
    #[schema(example = "CUSTOMER_ID")]
    pub column_name: String,
    /// Declared type; defaults to `string`
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub is_primary_key: Option<bool>,
}

/// Flag update applied to one column in a bulk operation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnFlagUpdate {
    pub id: Uuid,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub is_primary_key: Option<bool>,
}

/// Outcome of a bulk upsert-by-name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnUpsertSummary {
    pub created: usize,
    pub updated: usize,
}

/// Repository for table configurations and column declarations
#[derive(Debug, Clone)]
pub struct TableConfigRepository {
    db: Arc<DatabaseConnection>,
}

impl TableConfigRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewTableConfig) -> RepositoryResult<table_config::Model> {
        let config_name = required("config_name", &input.config_name)?;
        let table_name = table_identifier(&input.table_name)?;
        let page_size = bounded("page_size", input.page_size.unwrap_or(DEFAULT_PAGE_SIZE))?;
        let batch_size = bounded("batch_size", input.batch_size.unwrap_or(DEFAULT_BATCH_SIZE))?;
        self.check_connection(input.source_connection_id, Direction::Source)
            .await?;
        self.check_connection(input.destination_connection_id, Direction::Destination)
            .await?;

        let id = Uuid::new_v4();
        let now = Utc::now().fixed_offset();
        let active = table_config::ActiveModel {
            id: Set(id),
            config_name: Set(config_name),
            table_name: Set(table_name),
            title: Set(non_blank(input.title)),
            source_connection_id: Set(input.source_connection_id),
            destination_connection_id: Set(input.destination_connection_id),
            page_size: Set(page_size),
            batch_size: Set(batch_size),
            active: Set(input.active.unwrap_or(true)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&*self.db).await?;

        self.get(id).await
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: TableConfigChanges,
    ) -> RepositoryResult<table_config::Model> {
        let existing = self.get(id).await?;
        let mut model: table_config::ActiveModel = existing.into();

        if let Some(name) = changes.config_name {
            model.config_name = Set(required("config_name", &name)?);
        }
        if let Some(table_name) = changes.table_name {
            model.table_name = Set(table_identifier(&table_name)?);
        }
        if let Some(title) = changes.title {
            model.title = Set(non_blank(Some(title)));
        }
        if let Some(source) = changes.source_connection_id {
            self.check_connection(source, Direction::Source).await?;
            model.source_connection_id = Set(source);
        }
        if let Some(destination) = changes.destination_connection_id {
            self.check_connection(destination, Direction::Destination)
                .await?;
            model.destination_connection_id = Set(destination);
        }
        if let Some(page_size) = changes.page_size {
            model.page_size = Set(bounded("page_size", page_size)?);
        }
        if let Some(batch_size) = changes.batch_size {
            model.batch_size = Set(bounded("batch_size", batch_size)?);
        }
        if let Some(active) = changes.active {
            model.active = Set(active);
        }
        model.updated_at = Set(Utc::now().fixed_offset());

        model.update(&*self.db).await?;
        self.get(id).await
    }

    pub async fn find(&self, id: Uuid) -> RepositoryResult<Option<table_config::Model>> {
        Ok(TableConfig::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> RepositoryResult<table_config::Model> {
        self.find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("table configuration", id))
    }

    pub async fn list(&self) -> RepositoryResult<Vec<table_config::Model>> {
        Ok(TableConfig::find()
            .order_by_asc(table_config::Column::ConfigName)
            .all(&*self.db)
            .await?)
    }

    /// Deletes a configuration and its columns; run history is kept
    pub async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.get(id).await?;

        let txn = self.db.begin().await?;
        TableColumn::delete_many()
            .filter(table_column::Column::TableConfigId.eq(id))
            .exec(&txn)
            .await?;
        TableConfig::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        tracing::info!(table_config_id = %id, "Deleted table configuration");
        Ok(())
    }

    /// Duplicates a configuration and its columns under a new name
    pub async fn copy(&self, id: Uuid, new_name: &str) -> RepositoryResult<table_config::Model> {
        let source = self.get(id).await?;
        let columns = self.list_columns(id).await?;
        let config_name = required("config_name", new_name)?;

        let copy_id = Uuid::new_v4();
        let now = Utc::now().fixed_offset();

        let txn = self.db.begin().await?;
        table_config::ActiveModel {
            id: Set(copy_id),
            config_name: Set(config_name),
            table_name: Set(source.table_name),
            title: Set(source.title),
            source_connection_id: Set(source.source_connection_id),
            destination_connection_id: Set(source.destination_connection_id),
            page_size: Set(source.page_size),
            batch_size: Set(source.batch_size),
            active: Set(source.active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for column in columns {
            table_column::ActiveModel {
                id: Set(Uuid::new_v4()),
                table_config_id: Set(copy_id),
                column_name: Set(column.column_name),
                data_type: Set(column.data_type),
                active: Set(column.active),
                is_primary_key: Set(column.is_primary_key),
                position: Set(column.position),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        self.get(copy_id).await
    }

    /// Columns of a configuration in declaration order
    pub async fn list_columns(&self, table_id: Uuid) -> RepositoryResult<Vec<table_column::Model>> {
        columns_of(&*self.db, table_id).await
    }

    /// Active columns of a configuration in declaration order
    pub async fn active_columns(
        &self,
        table_id: Uuid,
    ) -> RepositoryResult<Vec<table_column::Model>> {
        Ok(self
            .list_columns(table_id)
            .await?
            .into_iter()
            .filter(|c| c.active)
            .collect())
    }

    pub async fn add_column(
        &self,
        table_id: Uuid,
        draft: ColumnDraft,
    ) -> RepositoryResult<table_column::Model> {
        self.get(table_id).await?;
        let column_name = column_identifier(&draft.column_name)?;
        let position = next_position(&*self.db, table_id).await?;
        let now = Utc::now().fixed_offset();

        let id = Uuid::new_v4();
        table_column::ActiveModel {
            id: Set(id),
            table_config_id: Set(table_id),
            column_name: Set(column_name),
            data_type: Set(normalize_type(draft.data_type.as_deref())),
            active: Set(draft.active.unwrap_or(true)),
            is_primary_key: Set(draft.is_primary_key.unwrap_or(false)),
            position: Set(position),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.get_column(table_id, id).await
    }

    pub async fn update_column(
        &self,
        table_id: Uuid,
        column_id: Uuid,
        draft: ColumnDraft,
    ) -> RepositoryResult<table_column::Model> {
        let existing = self.get_column(table_id, column_id).await?;
        let mut model: table_column::ActiveModel = existing.into();

        model.column_name = Set(column_identifier(&draft.column_name)?);
        if let Some(data_type) = draft.data_type.as_deref() {
            model.data_type = Set(normalize_type(Some(data_type)));
        }
        if let Some(active) = draft.active {
            model.active = Set(active);
        }
        if let Some(pk) = draft.is_primary_key {
            model.is_primary_key = Set(pk);
        }
        model.updated_at = Set(Utc::now().fixed_offset());
        model.update(&*self.db).await?;

        self.get_column(table_id, column_id).await
    }

    pub async fn delete_column(&self, table_id: Uuid, column_id: Uuid) -> RepositoryResult<()> {
        self.get_column(table_id, column_id).await?;
        TableColumn::delete_by_id(column_id).exec(&*self.db).await?;
        Ok(())
    }

    /// Applies flag changes to several columns atomically
    pub async fn bulk_update_flags(
        &self,
        table_id: Uuid,
        updates: Vec<ColumnFlagUpdate>,
    ) -> RepositoryResult<Vec<table_column::Model>> {
        self.get(table_id).await?;
        let now = Utc::now().fixed_offset();

        let txn = self.db.begin().await?;
        for update in updates {
            let existing = TableColumn::find_by_id(update.id)
                .filter(table_column::Column::TableConfigId.eq(table_id))
                .one(&txn)
                .await?
                .ok_or_else(|| RepositoryError::not_found("column", update.id))?;

            let mut model: table_column::ActiveModel = existing.into();
            if let Some(active) = update.active {
                model.active = Set(active);
            }
            if let Some(pk) = update.is_primary_key {
                model.is_primary_key = Set(pk);
            }
            model.updated_at = Set(now);
            model.update(&txn).await?;
        }
        txn.commit().await?;

        self.list_columns(table_id).await
    }

    /// Updates columns matched by name and inserts the rest
    pub async fn upsert_columns(
        &self,
        table_id: Uuid,
        drafts: Vec<ColumnDraft>,
    ) -> RepositoryResult<ColumnUpsertSummary> {
        self.get(table_id).await?;

        let mut seen = HashSet::new();
        for draft in &drafts {
            let name = column_identifier(&draft.column_name)?;
            if !seen.insert(name.clone()) {
                return Err(RepositoryError::invalid(
                    "column_name",
                    format!("column '{}' appears more than once", name),
                ));
            }
        }

        let now = Utc::now().fixed_offset();
        let mut summary = ColumnUpsertSummary {
            created: 0,
            updated: 0,
        };

        let txn = self.db.begin().await?;
        let existing = columns_of(&txn, table_id).await?;
        let mut position = existing.iter().map(|c| c.position).max().unwrap_or(0);

        for draft in drafts {
            let name = draft.column_name.trim().to_string();
            match existing.iter().find(|c| c.column_name == name) {
                Some(column) => {
                    let mut model: table_column::ActiveModel = column.clone().into();
                    if let Some(data_type) = draft.data_type.as_deref() {
                        model.data_type = Set(normalize_type(Some(data_type)));
                    }
                    if let Some(active) = draft.active {
                        model.active = Set(active);
                    }
                    if let Some(pk) = draft.is_primary_key {
                        model.is_primary_key = Set(pk);
                    }
                    model.updated_at = Set(now);
                    model.update(&txn).await?;
                    summary.updated += 1;
                }
                None => {
                    position += 1;
                    table_column::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        table_config_id: Set(table_id),
                        column_name: Set(name),
                        data_type: Set(normalize_type(draft.data_type.as_deref())),
                        active: Set(draft.active.unwrap_or(true)),
                        is_primary_key: Set(draft.is_primary_key.unwrap_or(false)),
                        position: Set(position),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await?;
                    summary.created += 1;
                }
            }
        }
        txn.commit().await?;

        Ok(summary)
    }

    async fn get_column(
        &self,
        table_id: Uuid,
        column_id: Uuid,
    ) -> RepositoryResult<table_column::Model> {
        TableColumn::find_by_id(column_id)
            .filter(table_column::Column::TableConfigId.eq(table_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("column", column_id))
    }

    async fn check_connection(&self, id: Uuid, direction: Direction) -> RepositoryResult<()> {
        let field = match direction {
            Direction::Source => "source_connection_id",
            Direction::Destination => "destination_connection_id",
        };
        let found = Connection::find_by_id(id)
            .filter(connection::Column::Direction.eq(direction))
            .one(&*self.db)
            .await?;
        if found.is_none() {
            return Err(RepositoryError::invalid(
                field,
                format!("no {:?} connection with id {}", direction, id).to_lowercase(),
            ));
        }
        Ok(())
    }
}

async fn columns_of<C: ConnectionTrait>(
    conn: &C,
    table_id: Uuid,
) -> RepositoryResult<Vec<table_column::Model>> {
    Ok(TableColumn::find()
        .filter(table_column::Column::TableConfigId.eq(table_id))
        .order_by_asc(table_column::Column::Position)
        .order_by_asc(table_column::Column::ColumnName)
        .all(conn)
        .await?)
}

async fn next_position<C: ConnectionTrait>(conn: &C, table_id: Uuid) -> RepositoryResult<i32> {
    let last = TableColumn::find()
        .filter(table_column::Column::TableConfigId.eq(table_id))
        .order_by_desc(table_column::Column::Position)
        .one(conn)
        .await?;
    Ok(last.map_or(1, |c| c.position + 1))
}

fn required(field: &'static str, value: &str) -> RepositoryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::invalid(
            field,
            format!("{} must not be empty", field),
        ));
    }
    Ok(trimmed.to_string())
}

fn bounded(field: &'static str, value: i32) -> RepositoryResult<i32> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&value) {
        return Err(RepositoryError::invalid(
            field,
            format!(
                "{} must be between {} and {}",
                field, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            ),
        ));
    }
    Ok(value)
}

fn table_identifier(value: &str) -> RepositoryResult<String> {
    identifier("table_name", value)
}

fn column_identifier(value: &str) -> RepositoryResult<String> {
    identifier("column_name", value)
}

fn identifier(field: &'static str, value: &str) -> RepositoryResult<String> {
    let trimmed = value.trim();
    if !is_valid_identifier(trimmed) {
        return Err(RepositoryError::invalid(
            field,
            format!(
                "'{}' is not a valid identifier (letters, digits and underscore, not starting with a digit, at most 63 characters)",
                trimmed
            ),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_type(data_type: Option<&str>) -> String {
    data_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_valid_identifier("CUSTOMER_ID"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier(&"a".repeat(63)));

        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1st"));
        assert!(!is_valid_identifier("name; DROP TABLE x"));
        assert!(!is_valid_identifier("quote\"d"));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn data_type_defaults_and_normalizes() {
        assert_eq!(normalize_type(None), "string");
        assert_eq!(normalize_type(Some("  ")), "string");
        assert_eq!(normalize_type(Some("DateTime")), "datetime");
    }

    #[test]
    fn page_size_bounds() {
        assert!(bounded("page_size", 1).is_ok());
        assert!(bounded("page_size", 10_000).is_ok());
        assert!(bounded("page_size", 0).is_err());
        assert!(bounded("page_size", 10_001).is_err());
    }
}

//! Relational destination
//!
//! Creates the destination table from the declared columns and upserts rows
//! one statement at a time. Existence is decided by primary-key equality.
//! A row that cannot be written is reported in the batch's skipped list and
//! never aborts the rest of the batch.

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    RuntimeErr, Statement, Value,
};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{
    BatchOutcome, ColumnSpec, DestinationAdapter, DestinationKind, SkippedRow, TableSpec,
    non_empty_text,
};
use crate::connectors::credentials::RelationalCredentials;
use crate::connectors::remote_query::Record;
use crate::error::SyncError;

const ADMIN_DATABASE: &str = "postgres";
const DUPLICATE_DATABASE: &str = "42P04";

/// SQL type used for a declared column type
pub fn sql_type(data_type: &str) -> &'static str {
    match data_type.trim().to_lowercase().as_str() {
        "number" | "float" | "integer" => "NUMERIC",
        "date" => "DATE",
        "datetime" => "TIMESTAMP",
        "boolean" => "BOOLEAN",
        _ => "VARCHAR(255)",
    }
}

/// Cast applied to a bound value. Text binds as unbounded `TEXT`; the
/// column's own length limit applies on write.
fn bind_type(data_type: &str) -> &'static str {
    match sql_type(data_type) {
        "VARCHAR(255)" => "TEXT",
        other => other,
    }
}

/// Double-quotes an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` for the table's active columns
pub fn create_table_sql(table: &TableSpec) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), sql_type(&c.data_type)))
        .collect();

    let keys: Vec<String> = table.primary_keys().map(|c| quote_ident(&c.name)).collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.table_name),
        parts.join(", ")
    )
}

/// Placeholder builder for one statement
struct Params {
    backend: DatabaseBackend,
    values: Vec<Value>,
}

impl Params {
    fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    /// Binds `text` and returns its placeholder, cast to the column type on Postgres
    fn bind(&mut self, column: &ColumnSpec, text: String) -> String {
        self.values.push(Value::from(text));
        match self.backend {
            DatabaseBackend::Postgres => {
                format!("${}::{}", self.values.len(), bind_type(&column.data_type))
            }
            _ => "?".to_string(),
        }
    }

    fn into_statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, self.values)
    }
}

/// Relational destination over a SeaORM connection
#[derive(Debug, Clone)]
pub struct RelationalAdapter {
    db: DatabaseConnection,
    bootstrap: Option<RelationalCredentials>,
}

impl RelationalAdapter {
    /// Adapter over an existing connection; no database bootstrap is attempted
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            bootstrap: None,
        }
    }

    /// Lazily connects to the configured database; `prepare` creates it when absent
    pub async fn connect(credentials: &RelationalCredentials) -> Result<Self, SyncError> {
        let url = credentials
            .database_url()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;
        let mut options = ConnectOptions::new(url);
        options
            .max_connections(4)
            .connect_timeout(Duration::from_secs(30))
            .connect_lazy(true)
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(|e| SyncError::Schema(format!("cannot open destination pool: {}", e)))?;

        Ok(Self {
            db,
            bootstrap: Some(credentials.clone()),
        })
    }

    async fn row_exists(
        &self,
        table: &TableSpec,
        keys: &[(&ColumnSpec, String)],
    ) -> Result<bool, DbErr> {
        let mut params = Params::new(self.db.get_database_backend());
        let predicate = key_predicate(&mut params, keys);
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} LIMIT 1",
            quote_ident(&table.table_name),
            predicate
        );
        Ok(self.db.query_one(params.into_statement(sql)).await?.is_some())
    }

    /// Applies one row; `Ok(None)` means nothing was written
    async fn upsert_row(
        &self,
        table: &TableSpec,
        row: &Record,
    ) -> Result<Option<RowWrite>, RowSkip> {
        if table.primary_keys().next().is_none() {
            return Err(RowSkip::reason("no primary key column declared"));
        }

        let mut keys = Vec::new();
        for column in table.primary_keys() {
            match non_empty_text(row, &column.name) {
                Some(value) => keys.push((column, value)),
                None => {
                    return Err(RowSkip::reason(format!(
                        "primary key column '{}' is empty",
                        column.name
                    )));
                }
            }
        }

        let backend = self.db.get_database_backend();
        let exists = self.row_exists(table, &keys).await.map_err(RowSkip::db)?;

        if exists {
            let mut params = Params::new(backend);
            let assignments: Vec<String> = table
                .columns
                .iter()
                .filter(|c| !c.is_primary_key)
                .filter_map(|c| {
                    non_empty_text(row, &c.name)
                        .map(|value| format!("{} = {}", quote_ident(&c.name), params.bind(c, value)))
                })
                .collect();
            if assignments.is_empty() {
                return Ok(None);
            }

            let predicate = key_predicate(&mut params, &keys);
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quote_ident(&table.table_name),
                assignments.join(", "),
                predicate
            );
            self.db
                .execute(params.into_statement(sql))
                .await
                .map_err(RowSkip::db)?;
            Ok(Some(RowWrite::Updated))
        } else {
            let mut params = Params::new(backend);
            let mut names = Vec::new();
            let mut placeholders = Vec::new();
            for column in &table.columns {
                if let Some(value) = non_empty_text(row, &column.name) {
                    names.push(quote_ident(&column.name));
                    placeholders.push(params.bind(column, value));
                }
            }

            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table.table_name),
                names.join(", "),
                placeholders.join(", ")
            );
            self.db
                .execute(params.into_statement(sql))
                .await
                .map_err(RowSkip::db)?;
            Ok(Some(RowWrite::Created))
        }
    }
}

fn key_predicate(params: &mut Params, keys: &[(&ColumnSpec, String)]) -> String {
    keys.iter()
        .map(|(column, value)| {
            format!(
                "{} = {}",
                quote_ident(&column.name),
                params.bind(column, value.clone())
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

enum RowWrite {
    Created,
    Updated,
}

struct RowSkip(String);

impl RowSkip {
    fn reason(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    fn db(err: DbErr) -> Self {
        Self(err.to_string())
    }
}

/// Creates the target database through the administrative database when it is missing
pub async fn ensure_database(credentials: &RelationalCredentials) -> Result<(), SyncError> {
    let admin_url = credentials
        .url_for(ADMIN_DATABASE)
        .map_err(|e| SyncError::Configuration(e.to_string()))?;
    let mut options = ConnectOptions::new(admin_url);
    options
        .max_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .sqlx_logging(false);

    let admin = Database::connect(options).await.map_err(|e| {
        SyncError::Schema(format!("cannot reach relational server: {}", e))
    })?;

    let exists = admin
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT 1 FROM pg_database WHERE datname = $1",
            [Value::from(credentials.database.clone())],
        ))
        .await
        .map_err(|e| SyncError::Schema(format!("cannot inspect databases: {}", e)))?
        .is_some();

    if !exists {
        let create = Statement::from_string(
            DatabaseBackend::Postgres,
            format!("CREATE DATABASE {}", quote_ident(&credentials.database)),
        );
        match admin.execute(create).await {
            Ok(_) => info!(database = %credentials.database, "Created destination database"),
            Err(err) if is_duplicate_database(&err) => {
                debug!(database = %credentials.database, "Database created concurrently")
            }
            Err(err) => {
                let _ = admin.close().await;
                return Err(SyncError::Schema(format!(
                    "cannot create database '{}': {}",
                    credentials.database, err
                )));
            }
        }
    }

    let _ = admin.close().await;
    Ok(())
}

fn is_duplicate_database(err: &DbErr) -> bool {
    if let DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) | DbErr::Query(RuntimeErr::SqlxError(sqlx_err)) = err
        && let Some(db_err) = sqlx_err.as_database_error()
        && db_err.code().is_some_and(|code| code == DUPLICATE_DATABASE)
    {
        return true;
    }
    err.to_string().contains("already exists")
}

#[async_trait]
impl DestinationAdapter for RelationalAdapter {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Relational
    }

    #[instrument(skip(self, table), fields(table = %table.table_name))]
    async fn prepare(&self, table: &TableSpec) -> Result<(), SyncError> {
        if let Some(credentials) = &self.bootstrap {
            ensure_database(credentials).await?;
        }

        let ddl = create_table_sql(table);
        debug!(%ddl, "Ensuring destination table");
        self.db
            .execute(Statement::from_string(self.db.get_database_backend(), ddl))
            .await
            .map_err(|e| {
                SyncError::Schema(format!(
                    "cannot create table '{}': {}",
                    table.table_name, e
                ))
            })?;
        Ok(())
    }

    async fn apply_batch(
        &self,
        table: &TableSpec,
        rows: &[Record],
    ) -> Result<BatchOutcome, SyncError> {
        let mut outcome = BatchOutcome::default();

        for row in rows {
            match self.upsert_row(table, row).await {
                Ok(Some(RowWrite::Created)) => outcome.creates += 1,
                Ok(Some(RowWrite::Updated)) => outcome.updates += 1,
                Ok(None) => {}
                Err(RowSkip(reason)) => {
                    warn!(table = %table.table_name, %reason, "Skipping row");
                    outcome.skipped.push(SkippedRow {
                        row: row.clone(),
                        reason,
                    });
                }
            }
        }

        debug!(
            table = %table.table_name,
            creates = outcome.creates,
            updates = outcome.updates,
            skipped = outcome.skipped.len(),
            "Relational batch applied"
        );
        Ok(outcome)
    }
}

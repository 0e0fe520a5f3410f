//! Sync Orchestrator
//!
//! Drives one run end to end: validate the table configuration, open a
//! ledger entry, page through the source, hand batches to the destination
//! adapter and close the ledger entry exactly once, whatever happened.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AppConfig, SyncConfig};
use crate::connectors::credentials::ConnectionCredentials;
use crate::connectors::remote_query::PdsClient;
use crate::crypto::CryptoKey;
use crate::destinations::{
    AdapterFactory, BatchOutcome, DestinationAdapter, DestinationKind, SkippedRow, TableSpec,
};
use crate::error::SyncError;
use crate::models::connection::Direction;
use crate::models::sync_run::SyncStatus;
use crate::models::table_config;
use crate::repositories::sync_run::RunTotals;
use crate::repositories::{
    ConnectionRepository, RepositoryError, SyncRunRepository, TableConfigRepository,
};

/// Result of a completed run
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub table_config_id: Uuid,
    pub status: SyncStatus,
    pub destination: DestinationKind,
    pub pages: u64,
    pub creates: u64,
    pub updates: u64,
    /// Rows the destination refused, with reasons
    pub skipped: Vec<SkippedRow>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything a run needs, resolved before the ledger entry is opened
struct RunPlan {
    config: table_config::Model,
    table: TableSpec,
    column_names: Vec<String>,
    source: PdsClient,
    destination: DestinationKind,
    destination_credentials: ConnectionCredentials,
}

#[derive(Debug, Default)]
struct Progress {
    pages: u64,
    outcome: BatchOutcome,
}

impl Progress {
    fn totals(&self) -> RunTotals {
        RunTotals {
            creates: self.outcome.creates,
            updates: self.outcome.updates,
            skipped: self.outcome.skipped.len() as u64,
        }
    }
}

/// Releases the per-table run lock when dropped
struct RunGuard<'a> {
    running: &'a Mutex<HashSet<Uuid>>,
    table_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.table_id);
    }
}

/// Runs syncs for table configurations
pub struct SyncOrchestrator {
    connections: ConnectionRepository,
    tables: TableConfigRepository,
    runs: SyncRunRepository,
    factory: Arc<dyn AdapterFactory>,
    settings: SyncConfig,
    running: Mutex<HashSet<Uuid>>,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        crypto_key: CryptoKey,
        config: &AppConfig,
        factory: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self {
            connections: ConnectionRepository::new(db.clone(), crypto_key),
            tables: TableConfigRepository::new(db.clone()),
            runs: SyncRunRepository::new((*db).clone()),
            factory,
            settings: config.sync.clone(),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a run for `table_id` is currently in flight
    pub fn is_running(&self, table_id: Uuid) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&table_id)
    }

    fn acquire(&self, table_id: Uuid) -> Result<RunGuard<'_>, SyncError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(table_id) {
            return Err(SyncError::AlreadyRunning(table_id));
        }
        Ok(RunGuard {
            running: &self.running,
            table_id,
        })
    }

    /// Builds a client for a PDS source connection
    pub async fn pds_client(&self, connection_id: Uuid) -> Result<PdsClient, SyncError> {
        let connection = self
            .connections
            .find(connection_id)
            .await
            .map_err(configuration)?
            .ok_or_else(|| {
                SyncError::Configuration(format!("connection {} not found", connection_id))
            })?;

        match self.connections.credentials(&connection).map_err(configuration)? {
            ConnectionCredentials::Pds(creds) => {
                PdsClient::new(&creds, self.settings.remote_timeout())
            }
            other => Err(SyncError::Configuration(format!(
                "connection {} is a {:?} connection, not a PDS source",
                connection_id,
                other.kind()
            ))),
        }
    }

    async fn plan(&self, table_id: Uuid) -> Result<RunPlan, SyncError> {
        let config = self
            .tables
            .find(table_id)
            .await
            .map_err(configuration)?
            .ok_or_else(|| {
                SyncError::Configuration(format!("table configuration {} not found", table_id))
            })?;

        let columns = self
            .tables
            .active_columns(table_id)
            .await
            .map_err(configuration)?;
        if columns.is_empty() {
            return Err(SyncError::Configuration(format!(
                "table configuration '{}' has no active columns",
                config.config_name
            )));
        }

        let source = self
            .connections
            .find(config.source_connection_id)
            .await
            .map_err(configuration)?
            .filter(|c| c.direction == Direction::Source)
            .ok_or_else(|| {
                SyncError::Configuration(format!(
                    "source connection {} not found",
                    config.source_connection_id
                ))
            })?;
        let destination = self
            .connections
            .find(config.destination_connection_id)
            .await
            .map_err(configuration)?
            .ok_or_else(|| {
                SyncError::Configuration(format!(
                    "destination connection {} not found",
                    config.destination_connection_id
                ))
            })?;

        let destination_kind = DestinationKind::for_connection(destination.kind)?;
        if destination.direction != Direction::Destination {
            return Err(SyncError::Configuration(format!(
                "connection '{}' is not a destination",
                destination.name
            )));
        }

        let source_client = match self
            .connections
            .credentials(&source)
            .map_err(configuration)?
        {
            ConnectionCredentials::Pds(creds) => {
                PdsClient::new(&creds, self.settings.remote_timeout())?
            }
            other => {
                return Err(SyncError::Configuration(format!(
                    "source connection '{}' must be a PDS connection, found {:?}",
                    source.name,
                    other.kind()
                )));
            }
        };
        let destination_credentials = self
            .connections
            .credentials(&destination)
            .map_err(configuration)?;

        Ok(RunPlan {
            table: TableSpec {
                table_name: config.table_name.clone(),
                columns: columns.iter().map(Into::into).collect(),
            },
            column_names: columns.iter().map(|c| c.column_name.clone()).collect(),
            config,
            source: source_client,
            destination: destination_kind,
            destination_credentials,
        })
    }

    /// Runs a sync of `table_id` to completion, cancellation or failure.
    ///
    /// Entry validation failures are returned before a ledger entry exists.
    /// Once the entry is open, it is finalized exactly once: `COMPLETED`
    /// with counts, or `FAILED` with the error text.
    #[instrument(skip(self, cancel), fields(table_id = %table_id))]
    pub async fn run(
        &self,
        table_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<RunSummary, SyncError> {
        let _guard = self.acquire(table_id)?;
        let plan = self.plan(table_id).await?;
        let adapter = self
            .factory
            .build(plan.destination, &plan.destination_credentials)
            .await?;

        let run = self
            .runs
            .start(table_id, plan.table.columns.len() as i32)
            .await?;
        let started = Instant::now();
        info!(
            run_id = %run.id,
            table = %plan.table.table_name,
            destination = plan.destination.as_str(),
            "Sync run in progress"
        );

        let mut progress = Progress::default();
        let result = {
            let work = self.execute(&plan, adapter.as_ref(), &mut progress, &cancel);
            let bounded = async {
                match self.settings.max_run_seconds {
                    Some(limit) => tokio::time::timeout(Duration::from_secs(limit), work)
                        .await
                        .unwrap_or(Err(SyncError::TimedOut(limit))),
                    None => work.await,
                }
            };
            tokio::select! {
                result = bounded => result,
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
            }
        };

        let elapsed = started.elapsed();
        histogram!("sync_run_duration_seconds").record(elapsed.as_secs_f64());
        let totals = progress.totals();

        let (status, message) = match &result {
            Ok(()) => (SyncStatus::Completed, None),
            Err(err) => (SyncStatus::Failed, Some(err.to_string())),
        };
        counter!("sync_runs_total", "status" => status.as_str()).increment(1);
        counter!("sync_rows_written_total", "kind" => "create").increment(totals.creates);
        counter!("sync_rows_written_total", "kind" => "update").increment(totals.updates);
        counter!("sync_rows_skipped_total").increment(totals.skipped);

        let finalized = self.runs.finish(run.id, status, totals, message).await;

        if let Err(err) = result {
            error!(
                run_id = %run.id,
                error_kind = err.kind(),
                error = %err,
                ?elapsed,
                "Sync run failed"
            );
            if let Err(ledger) = finalized {
                error!(run_id = %run.id, error = %ledger, "Failed to record failed run");
            }
            return Err(err);
        }

        let record = finalized?;
        info!(
            run_id = %run.id,
            creates = totals.creates,
            updates = totals.updates,
            skipped = totals.skipped,
            pages = progress.pages,
            ?elapsed,
            "Sync run completed"
        );

        Ok(RunSummary {
            run_id: run.id,
            table_config_id: table_id,
            status: record.status,
            destination: plan.destination,
            pages: progress.pages,
            creates: totals.creates,
            updates: totals.updates,
            skipped: progress.outcome.skipped,
            started_at: run.started_at.with_timezone(&Utc),
            finished_at: record
                .finished_at
                .map_or_else(Utc::now, |t| t.with_timezone(&Utc)),
        })
    }

    async fn execute(
        &self,
        plan: &RunPlan,
        adapter: &dyn DestinationAdapter,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        adapter.prepare(&plan.table).await?;

        let batch_size = usize::try_from(plan.config.batch_size.max(1)).unwrap_or(1);
        let mut next_key = None;

        loop {
            let page = plan
                .source
                .fetch_page(
                    &plan.config.table_name,
                    plan.config.page_size,
                    &plan.column_names,
                    next_key,
                )
                .await?;
            if page.items.is_empty() {
                debug!(pages = progress.pages, "Empty page, stopping");
                break;
            }
            progress.pages += 1;

            let chunk = match adapter.kind() {
                DestinationKind::Relational => page.items.len(),
                DestinationKind::Vector => batch_size,
            };
            for batch in page.items.chunks(chunk) {
                let outcome = adapter.apply_batch(&plan.table, batch).await?;
                if !outcome.skipped.is_empty() {
                    warn!(skipped = outcome.skipped.len(), "Rows skipped in batch");
                }
                progress.outcome.absorb(outcome);
            }

            match page.next_key {
                Some(key) => next_key = Some(key),
                None => break,
            }

            let delay = self.settings.page_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                }
            }
        }

        Ok(())
    }
}

fn configuration(err: RepositoryError) -> SyncError {
    match err {
        RepositoryError::Database(db) => SyncError::Ledger(db.to_string()),
        other => SyncError::Configuration(other.to_string()),
    }
}

//! Database migrations for the PDS sync console.
//!
//! Schema for connections, table configurations, declared columns and the
//! sync run ledger, managed with SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000100_create_connections;
mod m2026_01_05_000200_create_table_configs;
mod m2026_01_05_000300_create_table_columns;
mod m2026_01_05_000400_create_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000100_create_connections::Migration),
            Box::new(m2026_01_05_000200_create_table_configs::Migration),
            Box::new(m2026_01_05_000300_create_table_columns::Migration),
            Box::new(m2026_01_05_000400_create_sync_runs::Migration),
        ]
    }
}

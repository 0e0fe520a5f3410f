//! # Data Models
//!
//! SeaORM entities for connections, table configurations, declared columns
//! and the sync run ledger.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod sync_run;
pub mod table_column;
pub mod table_config;

pub use connection::Entity as Connection;
pub use sync_run::Entity as SyncRun;
pub use table_column::Entity as TableColumn;
pub use table_config::Entity as TableConfig;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "pds-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

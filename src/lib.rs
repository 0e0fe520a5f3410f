//! # PDS Sync Library
//!
//! Configuration store, sync pipeline and HTTP API for copying PDS tables
//! into relational databases or vector collections.

pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod destinations;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod sync_orchestrator;
pub mod telemetry;
pub use migration;

//! Stratum database layer: sqlx connection management, schema migrations,
//! repository implementations and directory seeding.
//!
//! This crate provides:
//! - Connection management ([`SqlConnector`], [`DbConfig`], [`DbHandle`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repository implementations of the `stratum-core` traits
//! - Directory seeding ([`seed_directory`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod repository;
mod schema;
mod seed;

pub use connection::{DbConfig, DbHandle, Dialect, PoolSettings, SqlConnector};
pub use error::DbError;
pub use schema::{expected_tables, run_migrations};
pub use seed::{SYSTEM_TENANT_NAME, SeedReport, SuperAdmin, seed_directory};

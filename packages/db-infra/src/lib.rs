//! Shared database configuration, the process-wide connection pool and
//! migration orchestration.
//! Used by the backend and the operator CLI.

pub mod config;
pub mod error;
pub mod migrate;
pub mod pool;

pub use config::db::{sanitize_db_url, DbConfig, DbKind, RuntimeEnv};
pub use error::DbInfraError;
pub use migrate::run_migrations;
pub use pool::{Pool, PoolPermit, PoolStats};

#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod db;
pub mod error;
pub mod errors;
pub mod health;
pub mod infra;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod state;

pub use db::{
    AsyncSession, AsyncSessionProvider, BlockingSession, BlockingSessionProvider, Session,
};
pub use error::{AppError, ErrorBody};
pub use errors::{DetailValue, Details, ErrorKind};
pub use health::{HealthReport, HealthReporter, HealthStatus, ServiceInfo, StorageSettings};
pub use infra::migration_state::{MigrationRecord, MigrationStateReader, MigrationSummary};
pub use infra::state::{build_state, StateBuilder};
pub use middleware::cors::cors_middleware;
pub use middleware::request_log::RequestLog;
pub use state::app_state::AppState;

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    backend_test_support::logging::init();
}

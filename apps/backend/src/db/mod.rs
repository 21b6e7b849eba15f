//! Database sessions.
//!
//! A session is a scoped unit of work bound to one pool slot. Application code
//! borrows one through a provider (`AsyncSessionProvider` for async callers,
//! `BlockingSessionProvider` for synchronous ones), runs its statements, and
//! hands it back when the closure returns. Transactions are scoped the same
//! way through `with_transaction`.

pub mod blocking;
pub mod session;
pub mod txn;

use async_trait::async_trait;
use sea_orm::{DatabaseBackend, QueryResult, Statement};

pub use blocking::{BlockingSession, BlockingSessionProvider};
pub use session::{AsyncSession, AsyncSessionProvider};

use crate::error::AppError;
use crate::state::app_state::AppState;

/// Storage capability exposed to application code.
///
/// Every method reports failures through [`AppError`]; driver errors are
/// translated before they leave the session.
#[async_trait]
pub trait Session: Send + Sync {
    fn backend(&self) -> DatabaseBackend;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, stmt: Statement) -> Result<u64, AppError>;

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, AppError>;

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, AppError>;

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, AppError>;

    /// Open a transaction. Returns `false` when one is already active, in
    /// which case the caller joins it and must not commit or roll back.
    async fn begin(&self) -> Result<bool, AppError>;

    async fn commit(&self) -> Result<(), AppError>;

    async fn rollback(&self) -> Result<(), AppError>;

    fn in_transaction(&self) -> bool;

    /// Discard the active transaction without awaiting. Used when a
    /// transaction scope is dropped before it completes; the driver rolls
    /// the discarded transaction back.
    fn abandon_transaction(&self);

    /// Build a statement for this session's backend.
    fn statement(&self, sql: &str, values: Vec<sea_orm::Value>) -> Statement {
        Statement::from_sql_and_values(self.backend(), sql, values)
    }
}

/// Session provider configured on the application state, or
/// `StorageUnavailable` when the process runs without storage.
pub fn require_sessions(state: &AppState) -> Result<&AsyncSessionProvider, AppError> {
    state
        .sessions()
        .ok_or_else(|| AppError::storage_unavailable().with_detail("reason", "not_configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::health::ServiceInfo;

    #[test]
    fn require_sessions_without_storage() {
        let state = AppState::without_storage(ServiceInfo::for_tests());
        let err = require_sessions(&state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(err.status().as_u16(), 503);
    }
}

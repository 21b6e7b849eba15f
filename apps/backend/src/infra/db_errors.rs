//! sea-orm -> AppError translation.
//!
//! Every storage call in the session layer funnels its `DbErr` through
//! [`map_db_err`]. The raw driver text is logged (redacted) and never placed
//! in the returned error.

use sea_orm::{ConnAcquireErr, DbErr, SqlErr};
use tracing::{error, warn};

use crate::error::AppError;
use crate::logging::pii::Redacted;

const UNIQUE_SQLITE: &str = "UNIQUE constraint failed: ";

fn mentions_sqlstate(msg: &str, code: &str) -> bool {
    msg.contains(&format!("SQLSTATE({code})")) || msg.contains(&format!("code: {code}"))
}

/// `UNIQUE constraint failed: politicians.name` -> `("politicians", "name")`.
///
/// Composite keys report every column; the first one names the conflict.
fn sqlite_unique_target(msg: &str) -> Option<(String, String)> {
    let start = msg.find(UNIQUE_SQLITE)? + UNIQUE_SQLITE.len();
    let first = msg[start..]
        .split([',', '\n', '"'])
        .next()?
        .split_whitespace()
        .next()?;
    let (table, column) = first.split_once('.')?;
    Some((table.to_owned(), column.to_owned()))
}

/// Constraint name quoted in a Postgres unique violation.
fn postgres_constraint(msg: &str) -> Option<&str> {
    let marker = "unique constraint \"";
    let start = msg.find(marker)? + marker.len();
    let rest = &msg[start..];
    rest.find('"').map(|end| &rest[..end])
}

/// Our unique indexes are named `ux_<table>_<column>`. Anything else is
/// reported against a generic record.
fn split_constraint(name: &str) -> (String, String) {
    if let Some(rest) = name.strip_prefix("ux_") {
        if let Some((table, column)) = rest.split_once('_') {
            return (table.to_owned(), column.to_owned());
        }
    }
    ("record".to_owned(), name.to_owned())
}

fn unique_violation(msg: &str) -> AppError {
    warn!(raw_error = %Redacted(msg), "unique constraint violation");
    let (table, column) = sqlite_unique_target(msg)
        .or_else(|| postgres_constraint(msg).map(split_constraint))
        .unwrap_or_else(|| ("record".to_owned(), "unknown".to_owned()));
    AppError::conflict(table, column)
}

/// SQLite gives up with SQLITE_BUSY / SQLITE_LOCKED once its busy timeout
/// runs out; Postgres reports `lock_not_available` (55P03).
fn lock_contention(msg: &str) -> bool {
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("SQLITE_BUSY")
        || msg.contains("SQLITE_LOCKED")
        || mentions_sqlstate(msg, "55P03")
}

fn integrity_violation(msg: &str, reason: &str) -> AppError {
    warn!(raw_error = %Redacted(msg), reason, "integrity constraint violation");
    AppError::invalid_input("record", reason)
}

/// Translate a `DbErr` into the error taxonomy.
pub fn map_db_err(e: DbErr) -> AppError {
    let msg = e.to_string();

    match &e {
        DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) => {
            warn!(raw_error = %Redacted(&msg), "database acquire timed out");
            return AppError::storage_timeout();
        }
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => {
            warn!(raw_error = %Redacted(&msg), "database unavailable");
            return AppError::storage_unavailable();
        }
        DbErr::RecordNotFound(what) => {
            return AppError::not_found(what.clone(), "unknown");
        }
        _ => {}
    }

    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => return unique_violation(&detail),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            return integrity_violation(&detail, "referenced record does not exist")
        }
        _ => {}
    }

    if msg.contains(UNIQUE_SQLITE)
        || mentions_sqlstate(&msg, "23505")
        || msg.contains("duplicate key value violates unique constraint")
    {
        return unique_violation(&msg);
    }

    if msg.contains("FOREIGN KEY constraint failed") || mentions_sqlstate(&msg, "23503") {
        return integrity_violation(&msg, "referenced record does not exist");
    }

    if msg.contains("CHECK constraint failed")
        || msg.contains("NOT NULL constraint failed")
        || mentions_sqlstate(&msg, "23514")
        || mentions_sqlstate(&msg, "23502")
    {
        return integrity_violation(&msg, "value violates a column constraint");
    }

    if lock_contention(&msg) {
        warn!(raw_error = %Redacted(&msg), "database locked");
        return AppError::storage_timeout().with_detail("reason", "lock_contention");
    }

    if msg.contains("timed out") || msg.contains("timeout") {
        warn!(raw_error = %Redacted(&msg), "database operation timed out");
        return AppError::storage_timeout();
    }

    if msg.contains("closed pool") || msg.contains("pool closed") {
        warn!(raw_error = %Redacted(&msg), "database pool closed");
        return AppError::storage_unavailable().with_detail("reason", "pool_closed");
    }

    error!(raw_error = %Redacted(&msg), "unhandled database error");
    AppError::internal()
}

#[cfg(test)]
mod tests {
    use sea_orm::RuntimeErr;

    use super::*;
    use crate::errors::ErrorKind;

    fn exec(msg: &str) -> DbErr {
        DbErr::Exec(RuntimeErr::Internal(msg.to_owned()))
    }

    #[test]
    fn sqlite_unique_names_table_and_column() {
        let err = map_db_err(exec("error returned from database: (code: 2067) UNIQUE constraint failed: politicians.name"));
        assert_eq!(err, AppError::conflict("politicians", "name"));
    }

    #[test]
    fn sqlite_composite_unique_takes_first_column() {
        assert_eq!(
            sqlite_unique_target("UNIQUE constraint failed: statements.politician_id, statements.date_made"),
            Some(("statements".into(), "politician_id".into()))
        );
    }

    #[test]
    fn postgres_unique_uses_constraint_name() {
        let err = map_db_err(exec(
            "duplicate key value violates unique constraint \"ux_politicians_name\"",
        ));
        assert_eq!(err, AppError::conflict("politicians", "name"));

        let err = map_db_err(exec(
            "duplicate key value violates unique constraint \"politicians_pkey\"",
        ));
        assert_eq!(err, AppError::conflict("record", "politicians_pkey"));
    }

    #[test]
    fn integrity_failures_are_invalid_input() {
        assert_eq!(
            map_db_err(exec("FOREIGN KEY constraint failed")).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            map_db_err(exec("CHECK constraint failed: score")).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn acquire_failures_are_storage_errors() {
        assert_eq!(
            map_db_err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)).kind(),
            ErrorKind::StorageTimeout
        );
        assert_eq!(
            map_db_err(DbErr::ConnectionAcquire(ConnAcquireErr::ConnectionClosed)).kind(),
            ErrorKind::StorageUnavailable
        );
        assert_eq!(
            map_db_err(DbErr::Conn(RuntimeErr::Internal("refused".into()))).kind(),
            ErrorKind::StorageUnavailable
        );
    }

    #[test]
    fn lock_contention_is_a_storage_timeout() {
        for raw in [
            "error returned from database: (code: 5) database is locked",
            "error returned from database: (code: 6) database table is locked",
            "SQLITE_BUSY: cannot commit",
        ] {
            let err = map_db_err(exec(raw));
            assert_eq!(err.kind(), ErrorKind::StorageTimeout, "{raw}");
            assert_eq!(
                err.details().get("reason").map(|v| v.to_string()),
                Some("lock_contention".into())
            );
        }
    }

    #[test]
    fn unknown_errors_are_internal_without_raw_text() {
        let err = map_db_err(exec("syntax error near \"SELEC\" password=hunter2"));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.message().contains("hunter2"));
        assert!(err.details().is_empty());
    }
}

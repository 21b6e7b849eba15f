use std::time::Instant;

use migration::{migrate, MigrationCommand};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tracing::{error, info};

use crate::config::db::DbKind;
use crate::error::DbInfraError;
use crate::pool::Pool;

/// Apply a migration command against the pool.
///
/// Migration tooling is operator-driven: the HTTP service never calls this,
/// only the CLI and test fixtures do.
pub async fn run_migrations(pool: &Pool, command: MigrationCommand) -> Result<(), DbInfraError> {
    let start = Instant::now();
    let kind = pool.kind();

    info!(
        cmd = ?command,
        db_kind = ?kind,
        engine = kind.engine(),
        url = %pool.config().sanitized_url(),
        "migrate=start"
    );

    if kind == DbKind::SqliteFile && !matches!(command, MigrationCommand::Status) {
        setup_sqlite_file_prerequisites(pool).await?;
    }

    migrate(pool.connection(), command).await.map_err(|e| {
        let message = e.to_string();
        if message.contains("database is locked") || message.contains("SQLITE_BUSY") {
            error!(cmd = ?command, "sqlite_busy op=migrate");
        }
        DbInfraError::Migration {
            message: format!("migration execution failed: {message}"),
        }
    })?;

    info!(
        cmd = ?command,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "migrate=done"
    );
    Ok(())
}

async fn setup_sqlite_file_prerequisites(pool: &Pool) -> Result<(), DbInfraError> {
    for pragma in ["PRAGMA journal_mode = WAL;", "PRAGMA synchronous = NORMAL;"] {
        pool.connection()
            .execute(Statement::from_string(DatabaseBackend::Sqlite, pragma))
            .await
            .map_err(|e| DbInfraError::Migration {
                message: format!("failed to apply '{pragma}': {e}"),
            })?;
    }
    Ok(())
}

//! Read-only view of the migration ledger.
//!
//! The ledger is the table the migrator records applied migrations in. It is
//! only ever read here: a database that has never been migrated has no
//! ledger, and that is reported as "nothing applied" rather than an error.

use std::collections::HashSet;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::db::{BlockingSession, Session};
use crate::error::AppError;

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub identifier: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
}

/// Ledger state compared against the migrations this build knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub ledger_present: bool,
    pub applied_count: usize,
    /// `None` when the ledger has drifted from the known set.
    pub pending_count: Option<usize>,
    pub latest: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<String>,
}

impl MigrationSummary {
    pub fn is_current(&self) -> bool {
        self.ledger_present && self.drift.is_empty() && self.pending_count == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStateReader {
    ledger_table: String,
}

impl Default for MigrationStateReader {
    fn default() -> Self {
        Self {
            ledger_table: migration::LEDGER_TABLE.to_owned(),
        }
    }
}

/// Table names are interpolated into SQL; only plain identifiers pass.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

/// Applied entries unknown to this build are drift and make the pending
/// count meaningless, so they fail with `InvalidInput`.
pub fn pending_against(applied: &[MigrationRecord], known: &[String]) -> Result<usize, AppError> {
    let drift = drifted(applied, known);
    if !drift.is_empty() {
        return Err(AppError::invalid_input(
            "migrations",
            format!("ledger lists migrations unknown to this build: {}", drift.join(", ")),
        ));
    }
    let applied: HashSet<&str> = applied.iter().map(|r| r.identifier.as_str()).collect();
    Ok(known.iter().filter(|k| !applied.contains(k.as_str())).count())
}

fn drifted(applied: &[MigrationRecord], known: &[String]) -> Vec<String> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();
    applied
        .iter()
        .filter(|r| !known.contains(r.identifier.as_str()))
        .map(|r| r.identifier.clone())
        .collect()
}

impl MigrationStateReader {
    pub fn with_ledger_table(name: &str) -> Result<Self, AppError> {
        if !is_plain_identifier(name) {
            return Err(AppError::invalid_input("ledger_table", "not a plain identifier"));
        }
        Ok(Self {
            ledger_table: name.to_owned(),
        })
    }

    pub fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    pub async fn ledger_exists<S: Session + ?Sized>(&self, session: &S) -> Result<bool, AppError> {
        let sql = match session.backend() {
            sea_orm::DatabaseBackend::Postgres => {
                "SELECT COUNT(*) AS n FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
            sea_orm::DatabaseBackend::Sqlite => {
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?"
            }
            sea_orm::DatabaseBackend::MySql => {
                "SELECT COUNT(*) AS n FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
        };
        let row = session
            .query_one(session.statement(sql, vec![self.ledger_table.as_str().into()]))
            .await?;
        let n = match row {
            Some(row) => row.try_get::<i64>("", "n")?,
            None => 0,
        };
        Ok(n > 0)
    }

    /// Applied migrations, oldest first. Empty when there is no ledger.
    pub async fn list_applied<S: Session + ?Sized>(
        &self,
        session: &S,
    ) -> Result<Vec<MigrationRecord>, AppError> {
        if !self.ledger_exists(session).await? {
            debug!(ledger = %self.ledger_table, "migration_state ledger_present=false");
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT version, applied_at FROM {} ORDER BY applied_at, version",
            self.ledger_table
        );
        let rows = session.query_all(session.statement(&sql, vec![])).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let identifier: String = row.try_get("", "version")?;
            let applied_unix: i64 = row.try_get("", "applied_at")?;
            let applied_at = OffsetDateTime::from_unix_timestamp(applied_unix).unwrap_or_else(|_| {
                warn!(identifier = %identifier, applied_unix, "migration_state applied_at out of range");
                OffsetDateTime::UNIX_EPOCH
            });
            records.push(MigrationRecord {
                description: migration::describe_migration(&identifier),
                identifier,
                applied_at,
            });
        }
        Ok(records)
    }

    /// Known migrations not yet applied.
    pub async fn pending_count<S: Session + ?Sized>(
        &self,
        session: &S,
        known: &[String],
    ) -> Result<usize, AppError> {
        let applied = self.list_applied(session).await?;
        pending_against(&applied, known)
    }

    /// Like [`Self::pending_count`] but reports drift instead of failing.
    pub async fn summary<S: Session + ?Sized>(
        &self,
        session: &S,
        known: &[String],
    ) -> Result<MigrationSummary, AppError> {
        let ledger_present = self.ledger_exists(session).await?;
        let applied = self.list_applied(session).await?;
        let drift = drifted(&applied, known);
        if !drift.is_empty() {
            warn!(drift = ?drift, "migration_state drift=true");
        }
        Ok(MigrationSummary {
            ledger_present,
            applied_count: applied.len(),
            pending_count: pending_against(&applied, known).ok(),
            latest: applied.last().map(|r| r.identifier.clone()),
            drift,
        })
    }

    pub fn list_applied_blocking(
        &self,
        session: &BlockingSession,
    ) -> Result<Vec<MigrationRecord>, AppError> {
        session.block_on(self.list_applied(session))
    }

    pub fn pending_count_blocking(
        &self,
        session: &BlockingSession,
        known: &[String],
    ) -> Result<usize, AppError> {
        session.block_on(self.pending_count(session, known))
    }

    pub fn summary_blocking(
        &self,
        session: &BlockingSession,
        known: &[String],
    ) -> Result<MigrationSummary, AppError> {
        session.block_on(self.summary(session, known))
    }
}

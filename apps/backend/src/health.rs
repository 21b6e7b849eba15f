//! Health reporting.
//!
//! Four levels, cheapest first: liveness (no storage access), connectivity
//! (one probe plus the engine version), detailed (table inventory, row counts
//! per tracked entity, pool occupancy and storage settings), and migrations
//! (ledger summary). Storage
//! failures never escape a check; they are folded into the report.

use std::collections::BTreeMap;
use std::time::Instant;

use db_infra::{DbConfig, PoolStats, RuntimeEnv};
use sea_orm::DatabaseBackend;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, trace, warn};

use crate::db::{AsyncSessionProvider, Session};
use crate::error::AppError;
use crate::infra::migration_state::{is_plain_identifier, MigrationStateReader, MigrationSummary};

pub const DEFAULT_SERVICE_NAME: &str = "The Sauce Bottle API";

/// Entities whose row counts the detailed check reports.
pub const TRACKED_ENTITIES: [&str; 2] = ["politicians", "statements"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    Liveness,
    Connectivity,
    Detailed,
    Migrations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbePhase {
    Pending,
    Probing,
    Done(HealthStatus),
}

/// Identity reported by every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub environment: RuntimeEnv,
}

impl ServiceInfo {
    pub fn new(environment: RuntimeEnv) -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            environment,
        }
    }

    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self::new(RuntimeEnv::Test)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub size: usize,
    pub outstanding: usize,
    pub available: usize,
}

impl From<PoolStats> for PoolSnapshot {
    fn from(s: PoolStats) -> Self {
        Self {
            size: s.size,
            outstanding: s.outstanding,
            available: s.available,
        }
    }
}

/// Storage settings the process was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageSettings {
    pub url_type: &'static str,
    pub db_kind: String,
    pub echo_sql: bool,
}

impl StorageSettings {
    fn of(config: &DbConfig) -> Self {
        Self {
            url_type: config.kind().engine(),
            db_kind: format!("{:?}", config.kind()),
            echo_sql: config.echo,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub check: CheckLevel,
    pub status: HealthStatus,
    /// `false` only when the service cannot do its job.
    pub healthy: bool,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub pid: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_counts: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrations: Option<MigrationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<StorageSettings>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl HealthReport {
    fn new(check: CheckLevel, service: &ServiceInfo) -> Self {
        Self {
            check,
            status: HealthStatus::Healthy,
            healthy: true,
            service: service.name.clone(),
            version: service.version.clone(),
            environment: service.environment.to_string(),
            pid: std::process::id(),
            checked_at: OffsetDateTime::now_utc(),
            storage_connected: None,
            engine: None,
            engine_version: None,
            error: None,
            tables: None,
            row_counts: None,
            entity_errors: BTreeMap::new(),
            migrations: None,
            pool: None,
            configuration: None,
            notes: Vec::new(),
        }
    }

    fn set_status(&mut self, status: HealthStatus) {
        self.status = status;
        self.healthy = status != HealthStatus::Unavailable;
    }

    fn unreachable(mut self, err: &AppError) -> Self {
        self.set_status(HealthStatus::Unavailable);
        self.storage_connected = Some(false);
        self.error = Some(err.kind().as_str().to_owned());
        self.notes.push(err.message().to_owned());
        self
    }
}

/// Tracks a single check through its phases for logging.
struct CheckRun {
    level: CheckLevel,
    phase: ProbePhase,
    started: Instant,
}

impl CheckRun {
    fn start(level: CheckLevel) -> Self {
        trace!(check = ?level, phase = ?ProbePhase::Pending, "health=check");
        Self {
            level,
            phase: ProbePhase::Pending,
            started: Instant::now(),
        }
    }

    fn probing(&mut self) {
        self.phase = ProbePhase::Probing;
        trace!(check = ?self.level, phase = ?self.phase, "health=check");
    }

    fn finish(mut self, report: HealthReport) -> HealthReport {
        self.phase = ProbePhase::Done(report.status);
        debug!(
            check = ?self.level,
            phase = ?self.phase,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "health=check"
        );
        report
    }
}

fn engine_name(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => "postgresql",
        DatabaseBackend::Sqlite => "sqlite",
        DatabaseBackend::MySql => "mysql",
    }
}

async fn engine_version<S: Session + ?Sized>(session: &S) -> Result<Option<String>, AppError> {
    let sql = match session.backend() {
        DatabaseBackend::Sqlite => "SELECT sqlite_version() AS version",
        DatabaseBackend::Postgres | DatabaseBackend::MySql => "SELECT version() AS version",
    };
    let row = session.query_one(session.statement(sql, vec![])).await?;
    match row {
        Some(row) => Ok(Some(row.try_get::<String>("", "version")?)),
        None => Ok(None),
    }
}

async fn count_rows<S: Session + ?Sized>(session: &S, entity: &str) -> Result<i64, AppError> {
    if !is_plain_identifier(entity) {
        return Err(AppError::invalid_input("entity", "not a plain identifier"));
    }
    let sql = format!("SELECT COUNT(*) AS n FROM {entity}");
    let row = session
        .query_one(session.statement(&sql, vec![]))
        .await?
        .ok_or_else(AppError::internal)?;
    Ok(row.try_get::<i64>("", "n")?)
}

/// Every user table in the database, sorted by name.
async fn list_tables<S: Session + ?Sized>(session: &S) -> Result<Vec<String>, AppError> {
    let sql = match session.backend() {
        DatabaseBackend::Sqlite => {
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        }
        DatabaseBackend::Postgres => {
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = current_schema() ORDER BY table_name"
        }
        DatabaseBackend::MySql => {
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_schema = DATABASE() ORDER BY table_name"
        }
    };
    let rows = session.query_all(session.statement(sql, vec![])).await?;
    rows.iter()
        .map(|row| row.try_get::<String>("", "name").map_err(AppError::from))
        .collect()
}

struct Findings {
    engine: &'static str,
    tables: Result<Vec<String>, AppError>,
    engine_version: Option<String>,
    row_counts: BTreeMap<String, i64>,
    entity_errors: BTreeMap<String, String>,
    migrations: Result<MigrationSummary, AppError>,
}

#[derive(Debug, Clone)]
pub struct HealthReporter {
    sessions: Option<AsyncSessionProvider>,
    reader: MigrationStateReader,
    known_migrations: Vec<String>,
    entities: Vec<String>,
    service: ServiceInfo,
}

impl HealthReporter {
    pub fn new(sessions: Option<AsyncSessionProvider>, service: ServiceInfo) -> Self {
        Self {
            sessions,
            reader: MigrationStateReader::default(),
            known_migrations: migration::known_migrations(),
            entities: TRACKED_ENTITIES.iter().map(|e| (*e).to_owned()).collect(),
            service,
        }
    }

    pub fn with_entities<I, E>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_known_migrations(mut self, known: Vec<String>) -> Self {
        self.known_migrations = known;
        self
    }

    pub fn service(&self) -> &ServiceInfo {
        &self.service
    }

    fn provider(&self, report: &mut HealthReport) -> Option<&AsyncSessionProvider> {
        if self.sessions.is_none() {
            report.set_status(HealthStatus::Unavailable);
            report.storage_connected = Some(false);
            report.notes.push("storage not configured".to_owned());
        }
        self.sessions.as_ref()
    }

    /// Process identity only. Never touches storage and never fails.
    pub fn liveness(&self) -> HealthReport {
        let run = CheckRun::start(CheckLevel::Liveness);
        run.finish(HealthReport::new(CheckLevel::Liveness, &self.service))
    }

    pub async fn connectivity(&self) -> HealthReport {
        let mut run = CheckRun::start(CheckLevel::Connectivity);
        let mut report = HealthReport::new(CheckLevel::Connectivity, &self.service);
        let Some(sessions) = self.provider(&mut report) else {
            return run.finish(report);
        };

        run.probing();
        let outcome = sessions
            .with_session(|s| {
                Box::pin(async move {
                    let version = engine_version(s).await.unwrap_or_else(|e| {
                        warn!(kind = %e.kind(), "health=engine_version failed=true");
                        None
                    });
                    Ok((engine_name(s.backend()), version))
                })
            })
            .await;

        let report = match outcome {
            Ok((engine, version)) => {
                report.storage_connected = Some(true);
                report.engine = Some(engine.to_owned());
                report.engine_version = version;
                report
            }
            Err(e) => {
                warn!(kind = %e.kind(), "health=connectivity connected=false");
                report.unreachable(&e)
            }
        };
        run.finish(report)
    }

    pub async fn detailed(&self) -> HealthReport {
        let mut run = CheckRun::start(CheckLevel::Detailed);
        let mut report = HealthReport::new(CheckLevel::Detailed, &self.service);
        let Some(sessions) = self.provider(&mut report) else {
            return run.finish(report);
        };

        run.probing();
        let entities = self.entities.clone();
        let reader = self.reader.clone();
        let known = self.known_migrations.clone();
        let outcome = sessions
            .with_session(move |s| {
                Box::pin(async move {
                    let engine_version = engine_version(s).await.unwrap_or(None);
                    let tables = list_tables(s).await;
                    let mut row_counts = BTreeMap::new();
                    let mut entity_errors = BTreeMap::new();
                    for entity in entities {
                        match count_rows(s, &entity).await {
                            Ok(n) => {
                                row_counts.insert(entity, n);
                            }
                            Err(e) => {
                                warn!(entity = %entity, kind = %e.kind(), "health=count failed=true");
                                entity_errors.insert(entity, format!("count failed ({})", e.kind()));
                            }
                        }
                    }
                    let migrations = reader.summary(s, &known).await;
                    Ok(Findings {
                        engine: engine_name(s.backend()),
                        tables,
                        engine_version,
                        row_counts,
                        entity_errors,
                        migrations,
                    })
                })
            })
            .await;

        let findings = match outcome {
            Ok(f) => f,
            Err(e) => {
                warn!(kind = %e.kind(), "health=detailed connected=false");
                return run.finish(report.unreachable(&e));
            }
        };

        report.storage_connected = Some(true);
        report.engine = Some(findings.engine.to_owned());
        report.engine_version = findings.engine_version;
        report.row_counts = Some(findings.row_counts);
        report.pool = Some(sessions.pool().stats().into());
        report.configuration = Some(StorageSettings::of(sessions.pool().config()));
        let mut degraded = !findings.entity_errors.is_empty();
        match findings.tables {
            Ok(tables) => report.tables = Some(tables),
            Err(e) => {
                warn!(kind = %e.kind(), "health=tables failed=true");
                degraded = true;
                report.notes.push(format!("table inventory unreadable ({})", e.kind()));
            }
        }
        report.entity_errors = findings.entity_errors;
        match findings.migrations {
            Ok(summary) => {
                degraded |= !summary.is_current();
                report.migrations = Some(summary);
            }
            Err(e) => {
                degraded = true;
                report.notes.push(format!("migration state unreadable ({})", e.kind()));
            }
        }
        if degraded {
            report.set_status(HealthStatus::Degraded);
        }
        run.finish(report)
    }

    pub async fn migrations(&self) -> HealthReport {
        let mut run = CheckRun::start(CheckLevel::Migrations);
        let mut report = HealthReport::new(CheckLevel::Migrations, &self.service);
        let Some(sessions) = self.provider(&mut report) else {
            return run.finish(report);
        };

        run.probing();
        let reader = self.reader.clone();
        let known = self.known_migrations.clone();
        let outcome = sessions
            .with_session(move |s| Box::pin(async move { reader.summary(s, &known).await }))
            .await;

        let report = match outcome {
            Ok(summary) => {
                report.storage_connected = Some(true);
                if !summary.ledger_present {
                    report.notes.push("migration ledger not found".to_owned());
                }
                if !summary.is_current() {
                    report.set_status(HealthStatus::Degraded);
                }
                report.migrations = Some(summary);
                report
            }
            Err(e) if e.kind().is_storage() => report.unreachable(&e),
            Err(e) => {
                report.storage_connected = Some(true);
                report.set_status(HealthStatus::Degraded);
                report.notes.push(format!("migration state unreadable ({})", e.kind()));
                report
            }
        };
        run.finish(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_never_needs_storage() {
        let reporter = HealthReporter::new(None, ServiceInfo::for_tests());
        let report = reporter.liveness();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.healthy);
        assert_eq!(report.service, DEFAULT_SERVICE_NAME);
        assert_eq!(report.environment, "test");
        assert!(report.storage_connected.is_none());
    }

    #[tokio::test]
    async fn unconfigured_storage_is_unavailable() {
        let reporter = HealthReporter::new(None, ServiceInfo::for_tests());
        let report = reporter.connectivity().await;
        assert_eq!(report.status, HealthStatus::Unavailable);
        assert!(!report.healthy);
        assert_eq!(report.storage_connected, Some(false));
        assert_eq!(report.notes, vec!["storage not configured".to_owned()]);
    }

    #[test]
    fn degraded_is_still_healthy() {
        let mut report = HealthReport::new(CheckLevel::Detailed, &ServiceInfo::for_tests());
        report.set_status(HealthStatus::Degraded);
        assert!(report.healthy);
        report.set_status(HealthStatus::Unavailable);
        assert!(!report.healthy);
    }

    #[test]
    fn report_serializes_lowercase_status() {
        let report = HealthReporter::new(None, ServiceInfo::for_tests()).liveness();
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["check"], "liveness");
        assert!(v.get("row_counts").is_none());
        assert!(v["checked_at"].as_str().unwrap().contains('T'));
    }
}

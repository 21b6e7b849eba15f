use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::db::{DbConfig, DbKind};
use crate::error::DbInfraError;

const PG_CONNECT_ATTEMPTS: u32 = 5;
const PG_CONNECT_INTERVAL_MS: u64 = 500;

/// Process-wide engine and connection pool.
///
/// Built once at startup and passed down explicitly; cloning is cheap and all
/// clones share the same underlying pool. Sessions are bounded by a fixed
/// number of permits: `checkout` queues once every permit is handed out.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    conn: DatabaseConnection,
    permits: Arc<Semaphore>,
    config: DbConfig,
    closed: AtomicBool,
}

/// A checked-out slot in the pool. Dropping it returns the slot.
#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub outstanding: usize,
    pub available: usize,
    pub closed: bool,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.inner.config.kind())
            .field("url", &self.inner.config.sanitized_url())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Retry a connection attempt with fixed interval delays.
/// Returns the error of the last attempt once all retries are exhausted.
async fn retry_connection<T, F, Fut>(
    mut connect_fn: F,
    max_attempts: u32,
    interval_ms: u64,
) -> Result<T, DbInfraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbInfraError>>,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match connect_fn().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(attempts = attempt, interval_ms, "connection_retry=success");
                }
                return Ok(result);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < max_attempts {
                    warn!(attempt, max_attempts, interval_ms, "connection_retry=failed");
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DbInfraError::connect("no error recorded after max attempts (this should not happen)")
    }))
}

impl Pool {
    /// Connect to the configured storage and build the pool.
    pub async fn connect(config: DbConfig) -> Result<Self, DbInfraError> {
        let kind = config.kind();
        info!(
            db_kind = ?kind,
            engine = kind.engine(),
            url = %config.sanitized_url(),
            pool_size = config.pool_size,
            "pool=connect"
        );

        let mut opt = ConnectOptions::new(config.url().to_string());
        opt.max_connections(config.pool_size)
            .min_connections(if kind == DbKind::SqliteMemory { 1 } else { 0 })
            .acquire_timeout(config.acquire_timeout)
            .connect_timeout(config.acquire_timeout)
            .sqlx_logging(config.echo);

        // SQLite connections are local and never need a retry.
        let conn = if kind.is_sqlite() {
            Database::connect(opt).await.map_err(|e| {
                DbInfraError::connect(format!("failed to connect to SQLite: {e}"))
            })?
        } else {
            retry_connection(
                || {
                    let opt = opt.clone();
                    async move {
                        Database::connect(opt).await.map_err(|e| {
                            DbInfraError::connect(format!("failed to connect to Postgres: {e}"))
                        })
                    }
                },
                PG_CONNECT_ATTEMPTS,
                PG_CONNECT_INTERVAL_MS,
            )
            .await?
        };

        info!(db_kind = ?kind, "pool=ready");

        Ok(Self {
            inner: Arc::new(PoolInner {
                conn,
                permits: Arc::new(Semaphore::new(config.pool_size as usize)),
                config,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Underlying sea-orm connection. Only the session layer should touch this.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.inner.conn
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    pub fn kind(&self) -> DbKind {
        self.inner.config.kind()
    }

    /// Check out a slot, waiting while the pool is exhausted.
    pub async fn checkout(&self) -> Result<PoolPermit, DbInfraError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DbInfraError::PoolClosed)?;
        Ok(PoolPermit { _permit: permit })
    }

    pub fn size(&self) -> usize {
        self.inner.config.pool_size as usize
    }

    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Number of slots currently checked out.
    pub fn outstanding(&self) -> usize {
        self.size().saturating_sub(self.available())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size(),
            outstanding: self.outstanding(),
            available: self.available(),
            closed: self.is_closed(),
        }
    }

    /// Tear the pool down. Only the first call has any effect.
    ///
    /// Pending and future checkouts fail with [`DbInfraError::PoolClosed`];
    /// slots already checked out stay valid until dropped.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("pool=close skipped already_closed=true");
            return;
        }

        self.inner.permits.close();
        match self.kind() {
            DbKind::Postgres => self.inner.conn.get_postgres_connection_pool().close().await,
            DbKind::SqliteFile | DbKind::SqliteMemory => {
                self.inner.conn.get_sqlite_connection_pool().close().await
            }
        }
        info!(db_kind = ?self.kind(), "pool=closed");
    }
}

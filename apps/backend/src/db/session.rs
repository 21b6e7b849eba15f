use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use db_infra::{DbConfig, Pool, PoolPermit};
use futures::future::BoxFuture;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, QueryResult,
    Statement, TransactionTrait,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::{txn, Session};
use crate::error::AppError;
use crate::logging::pii::Redacted;

/// A unit of work bound to one pool slot.
///
/// Statements run on the active transaction when there is one and on the
/// pool otherwise. Dropping the session returns its slot; an uncommitted
/// transaction still held at that point is rolled back by the driver.
pub struct AsyncSession {
    id: u64,
    conn: DatabaseConnection,
    txn: Mutex<Option<DatabaseTransaction>>,
    active: AtomicBool,
    abandoned: AtomicBool,
    opened_at: Instant,
    // Declared last so the transaction is released before the slot.
    _permit: PoolPermit,
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSession")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl AsyncSession {
    fn new(id: u64, conn: DatabaseConnection, permit: PoolPermit) -> Self {
        Self {
            id,
            conn,
            txn: Mutex::new(None),
            active: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            opened_at: Instant::now(),
            _permit: permit,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `f` inside a transaction on this session. Joins the active
    /// transaction if there is one.
    pub async fn with_transaction<'s, T, F>(&'s self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&'s AsyncSession) -> BoxFuture<'s, Result<T, AppError>>,
    {
        txn::with_transaction(self, f).await
    }

    async fn txn_slot(&self) -> MutexGuard<'_, Option<DatabaseTransaction>> {
        let mut slot = self.txn.lock().await;
        if self.abandoned.swap(false, Ordering::AcqRel) {
            if slot.take().is_some() {
                debug!(session = self.id, "txn=discarded");
            }
            self.active.store(false, Ordering::Release);
        }
        slot
    }
}

impl Drop for AsyncSession {
    fn drop(&mut self) {
        if self.txn.get_mut().is_some() {
            warn!(session = self.id, "session=released open_txn=true rolling_back=true");
        }
        trace!(
            session = self.id,
            held_ms = self.opened_at.elapsed().as_millis() as u64,
            "session=released"
        );
    }
}

#[async_trait]
impl Session for AsyncSession {
    fn backend(&self) -> DatabaseBackend {
        self.conn.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<u64, AppError> {
        let slot = self.txn_slot().await;
        let res = match slot.as_ref() {
            Some(txn) => txn.execute(stmt).await,
            None => self.conn.execute(stmt).await,
        };
        Ok(res?.rows_affected())
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, AppError> {
        let slot = self.txn_slot().await;
        let res = match slot.as_ref() {
            Some(txn) => txn.execute_unprepared(sql).await,
            None => self.conn.execute_unprepared(sql).await,
        };
        Ok(res?.rows_affected())
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, AppError> {
        let slot = self.txn_slot().await;
        let res = match slot.as_ref() {
            Some(txn) => txn.query_one(stmt).await,
            None => self.conn.query_one(stmt).await,
        };
        Ok(res?)
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, AppError> {
        let slot = self.txn_slot().await;
        let res = match slot.as_ref() {
            Some(txn) => txn.query_all(stmt).await,
            None => self.conn.query_all(stmt).await,
        };
        Ok(res?)
    }

    async fn begin(&self) -> Result<bool, AppError> {
        let mut slot = self.txn_slot().await;
        if slot.is_some() {
            trace!(session = self.id, "txn=join");
            return Ok(false);
        }
        let txn = self.conn.begin().await?;
        *slot = Some(txn);
        self.active.store(true, Ordering::Release);
        debug!(session = self.id, "txn=begin");
        Ok(true)
    }

    async fn commit(&self) -> Result<(), AppError> {
        let mut slot = self.txn_slot().await;
        let Some(txn) = slot.take() else {
            warn!(session = self.id, "txn=commit active=false");
            return Err(AppError::internal());
        };
        self.active.store(false, Ordering::Release);
        txn.commit().await?;
        debug!(session = self.id, "txn=commit");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), AppError> {
        let mut slot = self.txn_slot().await;
        let Some(txn) = slot.take() else {
            return Ok(());
        };
        self.active.store(false, Ordering::Release);
        txn.rollback().await?;
        debug!(session = self.id, "txn=rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.abandoned.load(Ordering::Acquire)
    }

    fn abandon_transaction(&self) {
        self.abandoned.store(true, Ordering::Release);
        // A statement in flight holds the slot; the flag is honoured on the
        // next access instead.
        if let Ok(mut slot) = self.txn.try_lock() {
            if slot.take().is_some() {
                warn!(session = self.id, "txn=abandoned");
            }
            self.active.store(false, Ordering::Release);
            self.abandoned.store(false, Ordering::Release);
        }
    }
}

/// Hands out [`AsyncSession`]s from a shared [`Pool`].
///
/// Cheap to clone. Every session is liveness-probed before it is handed out.
#[derive(Clone, Debug)]
pub struct AsyncSessionProvider {
    pool: Pool,
    next_id: Arc<AtomicU64>,
}

impl AsyncSessionProvider {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn connect(config: DbConfig) -> Result<Self, AppError> {
        Ok(Self::new(Pool::connect(config).await?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Borrow a session.
    ///
    /// Fails with `StorageTimeout` once the configured acquire deadline
    /// passes and with `StorageUnavailable` when the pool is closed or the
    /// liveness probe keeps failing.
    pub async fn acquire(&self) -> Result<AsyncSession, AppError> {
        let deadline = self.pool.config().acquire_timeout;
        let started = Instant::now();
        match tokio::time::timeout(deadline, self.checkout_live()).await {
            Ok(Ok(session)) => {
                trace!(
                    session = session.id,
                    wait_ms = started.elapsed().as_millis() as u64,
                    outstanding = self.pool.outstanding(),
                    "session=acquired"
                );
                Ok(session)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    outstanding = self.pool.outstanding(),
                    "session=acquire timed_out=true"
                );
                Err(AppError::storage_timeout()
                    .with_detail("waited_ms", deadline.as_millis() as i64))
            }
        }
    }

    async fn checkout_live(&self) -> Result<AsyncSession, AppError> {
        let permit = self.pool.checkout().await?;
        let config = self.pool.config();
        let attempts = config.acquire_attempts.max(1);

        for attempt in 1..=attempts {
            match self.probe().await {
                Ok(()) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    return Ok(AsyncSession::new(id, self.pool.connection().clone(), permit));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        attempts,
                        raw_error = %Redacted(&e.to_string()),
                        "session=probe failed=true"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(config.retry_interval).await;
                    }
                }
            }
        }

        Err(AppError::storage_unavailable().with_detail("attempts", attempts))
    }

    async fn probe(&self) -> Result<(), DbErr> {
        self.pool.connection().execute_unprepared("SELECT 1").await?;
        Ok(())
    }

    /// Run `f` with a borrowed session and return the session afterwards,
    /// whatever the outcome.
    pub async fn with_session<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: for<'s> FnOnce(&'s AsyncSession) -> BoxFuture<'s, Result<T, AppError>> + Send,
        T: Send,
    {
        let session = self.acquire().await?;
        let out = f(&session).await;
        drop(session);
        out
    }

    /// Run `f` inside a transaction on a fresh session: commit on `Ok`,
    /// roll back on `Err` and return the original error.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: for<'s> FnOnce(&'s AsyncSession) -> BoxFuture<'s, Result<T, AppError>> + Send,
        T: Send,
    {
        let session = self.acquire().await?;
        txn::with_transaction(&session, f).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//! Synchronous front end over the async session layer.
//!
//! The provider owns a private Tokio runtime and drives every storage call to
//! completion on it, so callers without an async context (CLI tools, scripts)
//! get the same session semantics as the HTTP server. None of these methods
//! may be called from inside an async task: `block_on` panics there.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use db_infra::{DbConfig, Pool};
use sea_orm::{DatabaseBackend, QueryResult, Statement};
use tokio::runtime::{Builder, Runtime};
use tracing::error;

use super::txn::{rollback_failed, TxnScope};
use super::{AsyncSession, AsyncSessionProvider, Session};
use crate::error::AppError;

pub struct BlockingSessionProvider {
    // Dropped before the runtime that created its connections.
    inner: AsyncSessionProvider,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for BlockingSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSessionProvider")
            .field("pool", self.inner.pool())
            .finish()
    }
}

impl BlockingSessionProvider {
    pub fn connect(config: DbConfig) -> Result<Self, AppError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("saucebottle-db")
            .enable_all()
            .build()
            .map_err(|e| {
                error!(error = %e, "blocking runtime failed to start");
                AppError::internal()
            })?;
        let inner = runtime.block_on(AsyncSessionProvider::connect(config))?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    pub fn pool(&self) -> &Pool {
        self.inner.pool()
    }

    /// Drive an arbitrary future on the provider's runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    pub fn acquire(&self) -> Result<BlockingSession, AppError> {
        let session = self.runtime.block_on(self.inner.acquire())?;
        Ok(BlockingSession {
            backend: session.backend(),
            inner: Some(session),
            runtime: Arc::clone(&self.runtime),
        })
    }

    pub fn with_session<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&BlockingSession) -> Result<T, AppError>,
    {
        let session = self.acquire()?;
        let out = f(&session);
        drop(session);
        out
    }

    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&BlockingSession) -> Result<T, AppError>,
    {
        let session = self.acquire()?;
        session.with_transaction(f)
    }

    pub fn close(&self) {
        self.runtime.block_on(self.inner.close());
    }
}

/// Synchronous counterpart of [`AsyncSession`].
///
/// The inherent methods block; the [`Session`] impl forwards to the wrapped
/// async session and is meant for futures driven through [`Self::block_on`].
pub struct BlockingSession {
    backend: DatabaseBackend,
    inner: Option<AsyncSession>,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for BlockingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSession")
            .field("id", &self.id())
            .field("in_transaction", &Session::in_transaction(self))
            .finish()
    }
}

impl BlockingSession {
    fn session(&self) -> Result<&AsyncSession, AppError> {
        self.inner.as_ref().ok_or_else(AppError::internal)
    }

    pub fn id(&self) -> Option<u64> {
        self.inner.as_ref().map(AsyncSession::id)
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    pub fn execute(&self, stmt: Statement) -> Result<u64, AppError> {
        let s = self.session()?;
        self.block_on(s.execute(stmt))
    }

    pub fn execute_unprepared(&self, sql: &str) -> Result<u64, AppError> {
        let s = self.session()?;
        self.block_on(s.execute_unprepared(sql))
    }

    pub fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, AppError> {
        let s = self.session()?;
        self.block_on(s.query_one(stmt))
    }

    pub fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, AppError> {
        let s = self.session()?;
        self.block_on(s.query_all(stmt))
    }

    pub fn begin(&self) -> Result<bool, AppError> {
        let s = self.session()?;
        self.block_on(s.begin())
    }

    pub fn commit(&self) -> Result<(), AppError> {
        let s = self.session()?;
        self.block_on(s.commit())
    }

    pub fn rollback(&self) -> Result<(), AppError> {
        let s = self.session()?;
        self.block_on(s.rollback())
    }

    /// Blocking form of [`AsyncSession::with_transaction`].
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Self) -> Result<T, AppError>,
    {
        if !self.begin()? {
            return f(self);
        }

        let scope = TxnScope::new(self);
        let settled = match f(self) {
            Ok(value) => self.commit().map(|()| value),
            Err(err) => match self.rollback() {
                Ok(()) => Err(err),
                Err(rb) => Err(rollback_failed(err, &rb)),
            },
        };
        scope.disarm();
        settled
    }
}

impl Drop for BlockingSession {
    fn drop(&mut self) {
        // Returning a driver connection spawns onto the runtime.
        let _guard = self.runtime.enter();
        drop(self.inner.take());
    }
}

#[async_trait]
impl Session for BlockingSession {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&self, stmt: Statement) -> Result<u64, AppError> {
        self.session()?.execute(stmt).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<u64, AppError> {
        self.session()?.execute_unprepared(sql).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, AppError> {
        self.session()?.query_one(stmt).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, AppError> {
        self.session()?.query_all(stmt).await
    }

    async fn begin(&self) -> Result<bool, AppError> {
        self.session()?.begin().await
    }

    async fn commit(&self) -> Result<(), AppError> {
        self.session()?.commit().await
    }

    async fn rollback(&self) -> Result<(), AppError> {
        self.session()?.rollback().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.as_ref().is_some_and(Session::in_transaction)
    }

    fn abandon_transaction(&self) {
        let _guard = self.runtime.enter();
        if let Some(s) = self.inner.as_ref() {
            s.abandon_transaction();
        }
    }
}

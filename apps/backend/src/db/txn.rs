use futures::future::BoxFuture;
use tracing::{error, trace, warn};

use super::Session;
use crate::error::AppError;

/// Run `f` inside a transaction on `session`.
///
/// 1) A transaction is already active → join it; the outer scope decides
///    the outcome.
/// 2) Otherwise begin one, commit on `Ok`, roll back on `Err` and return the
///    original error unchanged.
/// 3) If the rollback itself fails the caller gets `StorageUnavailable`
///    carrying the original error's kind and message.
///
/// Dropping the returned future before it completes discards the
/// transaction, which the driver rolls back.
pub async fn with_transaction<'s, S, T, F>(session: &'s S, f: F) -> Result<T, AppError>
where
    S: Session + ?Sized,
    F: FnOnce(&'s S) -> BoxFuture<'s, Result<T, AppError>>,
{
    if !session.begin().await? {
        trace!("txn=reuse");
        return f(session).await;
    }

    let scope = TxnScope::new(session);
    let out = f(session).await;
    let settled = match out {
        Ok(value) => session.commit().await.map(|()| value),
        Err(err) => match session.rollback().await {
            Ok(()) => Err(err),
            Err(rb) => Err(rollback_failed(err, &rb)),
        },
    };
    scope.disarm();
    settled
}

/// Error reported when rolling back after `original` failed as well.
pub fn rollback_failed(original: AppError, rollback: &AppError) -> AppError {
    error!(
        original_kind = %original.kind(),
        rollback_kind = %rollback.kind(),
        "txn=rollback failed=true"
    );
    AppError::storage_unavailable()
        .with_detail("cause", "rollback_failed")
        .with_detail("original_error", original.kind().as_str())
        .with_detail("original_message", original.message().to_owned())
}

/// Discards the session's transaction if dropped while still armed, i.e.
/// when the owning scope is cancelled or unwinds.
pub(crate) struct TxnScope<'a, S: Session + ?Sized> {
    session: &'a S,
    armed: bool,
}

impl<'a, S: Session + ?Sized> TxnScope<'a, S> {
    pub(crate) fn new(session: &'a S) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<S: Session + ?Sized> Drop for TxnScope<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            warn!("txn=scope_dropped completed=false");
            self.session.abandon_transaction();
        }
    }
}

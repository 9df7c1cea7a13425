//! Declarative transaction demarcation.
//!
//! `Transactional` wraps an async operation so that it runs inside the unit
//! of work's transaction. The outermost wrapped call owns the transaction: it
//! starts the context, tears the registration down when the operation
//! returns, and commits or rolls back. Nested wrapped calls only join; when
//! their outcome asks for a rollback they mark the context rollback-only and
//! leave the physical rollback to the outermost call.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;

use crate::context::SharedContext;
use crate::error::TransactionError;
use crate::manager::TransactionContextManager;
use crate::policy::{OutcomePolicy, RollbackOnError};

/// Runs operations inside the current unit of work's transaction.
///
/// ```no_run
/// # async fn example(manager: txn::TransactionContextManager) -> Result<(), txn::TransactionError> {
/// use txn::{NeverRollback, Transactional};
///
/// let total = Transactional::new(&manager)
///     .run(|| async { Ok::<_, txn::TransactionError>(40 + 2) })
///     .await?;
/// assert_eq!(total, 42);
///
/// Transactional::new(&manager)
///     .policy(NeverRollback)
///     .run(|| async { Ok::<_, txn::TransactionError>(()) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Transactional<'m, P = RollbackOnError> {
    manager: &'m TransactionContextManager,
    policy: P,
}

impl<'m> Transactional<'m> {
    /// Demarcation with the default `RollbackOnError` policy.
    pub fn new(manager: &'m TransactionContextManager) -> Self {
        Self {
            manager,
            policy: RollbackOnError,
        }
    }
}

impl<'m, P> Transactional<'m, P> {
    /// Replaces the outcome policy.
    pub fn policy<Q>(self, policy: Q) -> Transactional<'m, Q> {
        Transactional {
            manager: self.manager,
            policy,
        }
    }

    /// Runs `operation` inside a transaction.
    ///
    /// The operation's own error is always returned unchanged. Coordinator
    /// failures at the outermost level (start, commit or rollback) are
    /// converted into `E` and replace a successful result; when the operation
    /// itself failed, its error wins and the coordinator failure is logged.
    ///
    /// A panic inside the operation is treated as a rollback outcome and then
    /// resumed.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
        P: OutcomePolicy<T, E>,
    {
        let (context, registration) = match self.manager.current().await {
            Some(context) => {
                let embedded = context.lock().await.is_started();
                (context, (!embedded).then(|| Registration::new(self.manager)))
            }
            None => (
                self.manager.start().await?,
                Some(Registration::new(self.manager)),
            ),
        };
        let embedded = registration.is_none();
        if let Some(registration) = &registration {
            let started = context.lock().await.start().await;
            if let Err(err) = started {
                registration.release();
                return Err(err.into());
            }
        }

        let outcome = AssertUnwindSafe(operation()).catch_unwind().await;

        if let Some(registration) = &registration {
            registration.release();
        }

        match outcome {
            Ok(outcome) => {
                let rollback = self.policy.should_rollback(&outcome);
                let ended = end_transaction(&context, embedded, rollback).await;

                match (outcome, ended) {
                    (Ok(value), Ok(())) => Ok(value),
                    (Ok(_), Err(err)) => Err(err.into()),
                    (Err(err), Ok(())) => Err(err),
                    (Err(err), Err(txn_err)) => {
                        tracing::error!(
                            error = %txn_err,
                            "transaction failed to complete after the operation failed; returning the operation's error"
                        );
                        Err(err)
                    }
                }
            }
            Err(panic) => {
                if let Err(err) = end_transaction(&context, embedded, true).await {
                    tracing::error!(error = %err, "transaction failed to complete after the operation panicked");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Runs `operation` with the default policy. Shorthand for
/// `Transactional::new(manager).run(operation)`.
pub async fn transactional<F, Fut, T, E>(
    manager: &TransactionContextManager,
    operation: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TransactionError>,
{
    Transactional::new(manager).run(operation).await
}

/// Owns the manager registration of an outermost call.
///
/// Dropping it before `release` means the call was cancelled mid-flight; the
/// registration is cleared anyway so later calls on the manager start a
/// fresh transaction instead of joining the abandoned one.
struct Registration<'m> {
    manager: &'m TransactionContextManager,
    active: AtomicBool,
}

impl<'m> Registration<'m> {
    fn new(manager: &'m TransactionContextManager) -> Self {
        Self {
            manager,
            active: AtomicBool::new(true),
        }
    }

    fn release(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.manager.clear();
        }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.active.load(Ordering::SeqCst) {
            tracing::warn!("transactional call dropped before completion; tearing down its context");
            self.release();
        }
    }
}

async fn end_transaction(
    context: &SharedContext,
    embedded: bool,
    rollback: bool,
) -> Result<(), TransactionError> {
    let mut context = context.lock().await;

    if embedded {
        if rollback {
            context.set_rollback_only()?;
        }
        return Ok(());
    }

    if context.is_rollback_only()? || rollback {
        context.rollback().await
    } else {
        context.commit().await.map(|_| ())
    }
}

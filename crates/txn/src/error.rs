//! Transaction error types.

use thiserror::Error;

use crate::resource::ResourceError;
use crate::state::TransactionState;

/// A resource failure recorded while the context kept processing the
/// remaining resources.
#[derive(Debug, Error)]
#[error("resource #{index} ({kind}) failed: {error}")]
pub struct ResourceFailure {
    /// Registration index of the resource inside its context.
    pub index: usize,
    /// Resource variant name.
    pub kind: &'static str,
    /// The resource's own error.
    #[source]
    pub error: ResourceError,
}

/// Errors raised by the transaction coordinator.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `start` was called on a context that is already started.
    #[error("The transaction has already been started. You can only start the transaction once")]
    AlreadyStarted,

    /// An operation that needs a started context was called before `start`.
    #[error("The transaction has not been started. You must start the transaction before you can {action}")]
    NotStarted { action: &'static str },

    /// Commit was requested after the context was rolled back.
    #[error("The transaction has already been rolled back and can't be committed")]
    AlreadyRolledBack,

    /// Rollback was requested after the context was committed.
    #[error("The transaction has already been committed and can't be rolled back")]
    AlreadyCommitted,

    /// Commit was requested on a rollback-only context.
    #[error("The transaction can't be committed because it has been set as rollback-only")]
    RollbackOnly,

    /// The context reached a terminal state and no longer accepts the action.
    #[error("The transaction is {state}. It must be active in order to {action}")]
    Completed {
        state: TransactionState,
        action: &'static str,
    },

    /// The unit of work already has an active transaction context.
    #[error("A transaction context is already active for this unit of work")]
    ContextActive,

    /// A resource failed to start. Resources started before it were rolled back.
    #[error("Error while starting the {kind} transaction: {source}")]
    Start {
        kind: &'static str,
        #[source]
        source: ResourceError,
    },

    /// The first resource failed to commit. The remaining resources were
    /// rolled back.
    #[error("The {kind} transaction failed to commit: {source}")]
    Commit {
        kind: &'static str,
        #[source]
        source: ResourceError,
    },

    /// One or more resources failed to roll back. Every resource was still
    /// given a rollback attempt.
    #[error(
        "Unable to roll back all of the transactions that were active. {} resource(s) failed during rollback",
        failures.len()
    )]
    Rollback { failures: Vec<ResourceFailure> },
}

impl TransactionError {
    /// Returns true for programmer errors: lifecycle calls made in the wrong
    /// state. These are never worth retrying.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            TransactionError::AlreadyStarted
                | TransactionError::NotStarted { .. }
                | TransactionError::AlreadyRolledBack
                | TransactionError::AlreadyCommitted
                | TransactionError::RollbackOnly
                | TransactionError::Completed { .. }
                | TransactionError::ContextActive
                | TransactionError::Start {
                    source: ResourceError::AlreadyStarted { .. },
                    ..
                }
        )
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, TransactionError>;

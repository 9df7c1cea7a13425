//! Errors raised by the session resource variant.

use thiserror::Error;
use txn::TransactionError;

/// Errors that can occur while opening or using a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was closed by its provider.
    #[error("The session has been closed")]
    Closed,

    /// `begin` was called while a session transaction is active.
    #[error("The session already has an active transaction")]
    AlreadyActive,

    /// `commit` or `rollback` was called without an active transaction.
    #[error("The session has no active transaction to {action}")]
    NotActive { action: &'static str },

    /// A failure injected by an in-memory session.
    #[error("simulated session {operation} failure")]
    Simulated { operation: &'static str },

    /// The session couldn't join the running transaction.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

//! Errors raised by the PostgreSQL resource variant.

use thiserror::Error;
use txn::TransactionError;

/// Errors that can occur while handing out or using a pooled connection.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The connection was already returned to the pool.
    #[error("The connection has been released back to the pool")]
    Released,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The connection couldn't join the running transaction.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Result type for connection operations.
pub type Result<T> = std::result::Result<T, SqlError>;

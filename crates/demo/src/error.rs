//! Demo error types.

use thiserror::Error;
use txn::TransactionError;
use txn_session::SessionError;
use txn_sql::SqlError;

/// Errors returned by a transfer.
#[derive(Debug, Error)]
pub enum DemoError {
    /// The account doesn't exist.
    #[error("Account {0} not found")]
    AccountNotFound(i32),

    /// The source account can't cover the transfer.
    #[error("Account {account} has insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: i32,
        balance: i64,
        requested: i64,
    },

    /// Connection handling failed.
    #[error("Connection error: {0}")]
    Sql(#[from] SqlError),

    /// A query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The journal session failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The transaction coordinator failed.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Result type for demo operations.
pub type Result<T> = std::result::Result<T, DemoError>;

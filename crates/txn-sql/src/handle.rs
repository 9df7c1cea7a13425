//! Shared handle to a pooled PostgreSQL connection.

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, Postgres};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::error::{Result, SqlError};

#[derive(Debug)]
struct HandleState {
    connection: Option<PoolConnection<Postgres>>,
    in_transaction: bool,
}

/// A pooled connection shared by everyone in one unit of work.
///
/// Clones refer to the same connection. The handle tracks whether a
/// transaction is open on the connection; outside a transaction every
/// statement runs in auto-commit mode.
#[derive(Debug, Clone)]
pub struct PgConnectionHandle {
    state: Arc<Mutex<HandleState>>,
}

impl PgConnectionHandle {
    /// Wraps a connection checked out of a pool.
    pub fn new(connection: PoolConnection<Postgres>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                connection: Some(connection),
                in_transaction: false,
            })),
        }
    }

    /// Returns true while a transaction is open, i.e. auto-commit is off.
    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.in_transaction
    }

    /// Returns true once the connection went back to the pool.
    pub async fn is_released(&self) -> bool {
        self.state.lock().await.connection.is_none()
    }

    /// Locks the connection for running queries.
    ///
    /// ```no_run
    /// # async fn example(handle: txn_sql::PgConnectionHandle) -> txn_sql::Result<()> {
    /// let mut conn = handle.connection().await?;
    /// sqlx::query("UPDATE accounts SET balance = balance - 10 WHERE id = 1")
    ///     .execute(&mut *conn)
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, PgConnection>> {
        let guard = self.state.lock().await;
        MutexGuard::try_map(guard, |state| state.connection.as_deref_mut())
            .map_err(|_| SqlError::Released)
    }

    /// Opens a transaction with `BEGIN`.
    pub async fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let connection = state.connection.as_deref_mut().ok_or(SqlError::Released)?;
        connection.execute("BEGIN").await?;
        state.in_transaction = true;
        Ok(())
    }

    /// Commits the open transaction with `COMMIT`.
    pub async fn commit(&self) -> Result<()> {
        self.finish("COMMIT").await
    }

    /// Rolls back the open transaction with `ROLLBACK`.
    pub async fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&self, statement: &'static str) -> Result<()> {
        let mut state = self.state.lock().await;
        let connection = state.connection.as_deref_mut().ok_or(SqlError::Released)?;
        let outcome = connection.execute(statement).await;
        // Postgres ends the transaction even when COMMIT reports an error.
        state.in_transaction = false;
        outcome?;
        Ok(())
    }

    /// Returns the connection to its pool, rolling back a transaction that
    /// was left open. Releasing twice is a no-op.
    pub async fn release(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut connection) = state.connection.take() else {
            return Ok(());
        };

        if state.in_transaction {
            state.in_transaction = false;
            tracing::warn!("connection released with an open transaction; rolling back");
            (&mut *connection).execute("ROLLBACK").await?;
        }
        Ok(())
    }
}

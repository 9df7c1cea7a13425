//! Account transfers that update PostgreSQL and a journal session together.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use txn::{ContextId, TransactionContextManager, TransactionError, Transactional};
use txn_session::{InMemorySession, InMemoryStore, SessionProvider, SessionSlot};
use txn_sql::{ConnectionProvider, ConnectionSlot};

use crate::error::{DemoError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INT PRIMARY KEY,
    balance BIGINT NOT NULL CHECK (balance >= 0)
);
";

/// Outcome of a committed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    /// Transaction the transfer committed in.
    pub context_id: ContextId,
    /// Journal key the transfer was recorded under.
    pub journal_key: String,
    pub from: i32,
    pub to: i32,
    pub amount: i64,
}

/// Moves money between accounts and journals every transfer.
///
/// Each transfer is its own unit of work: a fresh manager with a connection
/// provider and a journal session provider, torn down once the transfer ends.
#[derive(Debug, Clone)]
pub struct Bank {
    pool: PgPool,
    journal: InMemoryStore,
}

impl Bank {
    /// Creates a bank over `pool` that journals into `journal`.
    pub fn new(pool: PgPool, journal: InMemoryStore) -> Self {
        Self { pool, journal }
    }

    /// Returns the journal store.
    pub fn journal(&self) -> &InMemoryStore {
        &self.journal
    }

    /// Creates the accounts table if needed.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Creates or resets an account.
    pub async fn open_account(&self, id: i32, balance: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, balance) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET balance = EXCLUDED.balance",
        )
        .bind(id)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the committed balance of an account.
    pub async fn balance(&self, id: i32) -> Result<i64> {
        sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DemoError::AccountNotFound(id))
    }

    /// Moves `amount` from one account to another.
    ///
    /// The debit, the credit and the journal entry commit together or not
    /// at all.
    #[tracing::instrument(skip(self))]
    pub async fn transfer(&self, from: i32, to: i32, amount: i64) -> Result<TransferReceipt> {
        let connection_slot = ConnectionSlot::new();
        let session_slot = SessionSlot::<InMemorySession>::new();
        let manager = TransactionContextManager::new()
            .with_source(Arc::new(connection_slot.clone()))
            .with_source(Arc::new(session_slot.clone()));
        let connections =
            ConnectionProvider::new(self.pool.clone(), connection_slot, manager.clone());
        let sessions =
            SessionProvider::new(Arc::new(self.journal.clone()), session_slot, manager.clone());

        let result: Result<TransferReceipt> = Transactional::new(&manager)
            .run(|| async {
                let context = manager
                    .current()
                    .await
                    .ok_or(TransactionError::NotStarted { action: "transfer" })?;
                let context_id = context.lock().await.id();
                let journal_key = format!("transfer:{context_id}");

                debit(&connections, from, amount).await?;
                credit(&connections, to, amount).await?;

                let session = sessions.setup_session().await?;
                session.put(&journal_key, format!("{from}->{to}:{amount}"))?;

                Ok(TransferReceipt {
                    context_id,
                    journal_key,
                    from,
                    to,
                    amount,
                })
            })
            .await;

        let closed_connection = connections.teardown_connection().await;
        let closed_session = sessions.teardown_session().await;

        let receipt = result?;
        closed_connection?;
        closed_session?;

        metrics::counter!("demo_transfers_total").increment(1);
        tracing::info!(context_id = %receipt.context_id, "transfer committed");
        Ok(receipt)
    }
}

async fn debit(connections: &ConnectionProvider, account: i32, amount: i64) -> Result<()> {
    let handle = connections.setup_connection().await?;
    let mut conn = handle.connection().await?;

    let balance: i64 = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(account)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DemoError::AccountNotFound(account))?;
    if balance < amount {
        return Err(DemoError::InsufficientFunds {
            account,
            balance,
            requested: amount,
        });
    }

    sqlx::query("UPDATE accounts SET balance = balance - $1 WHERE id = $2")
        .bind(amount)
        .bind(account)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn credit(connections: &ConnectionProvider, account: i32, amount: i64) -> Result<()> {
    let handle = connections.setup_connection().await?;
    let mut conn = handle.connection().await?;

    let updated = sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
        .bind(amount)
        .bind(account)
        .execute(&mut *conn)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(DemoError::AccountNotFound(account));
    }
    Ok(())
}

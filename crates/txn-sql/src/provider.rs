//! Hands out the unit of work's connection and registers it with the
//! current transaction.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;
use txn::{ResourceSource, TransactionContextManager, TransactionalResource};

use crate::error::Result;
use crate::handle::PgConnectionHandle;
use crate::resource::ConnectionResource;

/// Holds the connection already checked out for a unit of work.
///
/// Register the slot with the `TransactionContextManager` so that a
/// transaction started after the connection was handed out still covers it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSlot {
    handle: Arc<Mutex<Option<PgConnectionHandle>>>,
}

impl ConnectionSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection held by the slot, if any.
    pub async fn get(&self) -> Option<PgConnectionHandle> {
        self.handle.lock().await.clone()
    }
}

#[async_trait]
impl ResourceSource for ConnectionSlot {
    async fn established(&self) -> Option<Box<dyn TransactionalResource>> {
        self.get()
            .await
            .map(|handle| Box::new(ConnectionResource::new(handle)) as Box<dyn TransactionalResource>)
    }
}

/// Lazily checks a connection out of the pool for one unit of work.
///
/// The first call to `setup_connection` acquires a connection, keeps it in
/// the slot and, if a transaction is active, adds it to that transaction.
/// Later calls return the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    pool: PgPool,
    slot: ConnectionSlot,
    manager: TransactionContextManager,
}

impl ConnectionProvider {
    /// Creates a provider for one unit of work.
    pub fn new(pool: PgPool, slot: ConnectionSlot, manager: TransactionContextManager) -> Self {
        Self {
            pool,
            slot,
            manager,
        }
    }

    /// Returns the pool connections are checked out of.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the unit of work's connection, checking one out on first use.
    ///
    /// A fresh connection is only kept once it has joined the running
    /// transaction. If joining fails it goes straight back to the pool.
    #[tracing::instrument(skip(self))]
    pub async fn setup_connection(&self) -> Result<PgConnectionHandle> {
        let mut slot = self.slot.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let handle = PgConnectionHandle::new(self.pool.acquire().await?);
        tracing::debug!("connection checked out");

        if let Some(context) = self.manager.current().await {
            let joined = context
                .lock()
                .await
                .add(Box::new(ConnectionResource::new(handle.clone())))
                .await;
            if let Err(err) = joined {
                if let Err(release_err) = handle.release().await {
                    tracing::error!(error = %release_err, "unable to release a connection that failed to join the transaction");
                }
                return Err(err.into());
            }
        }

        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Releases the unit of work's connection back to the pool. Does nothing
    /// when no connection was handed out.
    #[tracing::instrument(skip(self))]
    pub async fn teardown_connection(&self) -> Result<()> {
        let handle = self.slot.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.release().await?;
            tracing::debug!("connection released");
        }
        Ok(())
    }
}

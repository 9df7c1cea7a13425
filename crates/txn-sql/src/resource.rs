//! The PostgreSQL connection variant of `TransactionalResource`.

use async_trait::async_trait;
use txn::{ResourceError, TransactionalResource};

use crate::handle::PgConnectionHandle;

/// Resource kind reported for PostgreSQL connections.
pub const KIND: &str = "postgres";

/// Makes a pooled connection take part in a transaction context.
///
/// The connection counts as started while it has an open transaction, so a
/// second `start` without a commit or rollback in between fails with
/// `ResourceError::AlreadyStarted`.
#[derive(Debug, Clone)]
pub struct ConnectionResource {
    handle: PgConnectionHandle,
}

impl ConnectionResource {
    /// Wraps a connection handle.
    pub fn new(handle: PgConnectionHandle) -> Self {
        Self { handle }
    }

    /// Returns the wrapped handle.
    pub fn wrapped(&self) -> &PgConnectionHandle {
        &self.handle
    }
}

#[async_trait]
impl TransactionalResource for ConnectionResource {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn start(&mut self) -> Result<(), ResourceError> {
        if self.handle.in_transaction().await {
            return Err(ResourceError::AlreadyStarted { kind: KIND });
        }
        self.handle.begin().await.map_err(ResourceError::backend)
    }

    async fn commit(&mut self) -> Result<(), ResourceError> {
        self.handle.commit().await.map_err(ResourceError::backend)
    }

    async fn rollback(&mut self) -> Result<(), ResourceError> {
        self.handle.rollback().await.map_err(ResourceError::backend)
    }
}

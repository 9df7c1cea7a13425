//! The session capability a unit-of-work store has to offer.

use async_trait::async_trait;

use crate::error::Result;

/// A unit-of-work session with its own transaction.
///
/// Clones of a session must refer to the same underlying session, so that
/// the provider, the transaction context and the caller all act on one
/// transaction.
#[async_trait]
pub trait Session: Clone + Send + Sync + 'static {
    /// Returns true while a session transaction is active.
    async fn is_active(&self) -> bool;

    /// Begins a session transaction.
    async fn begin(&self) -> Result<()>;

    /// Commits the active session transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the active session transaction.
    async fn rollback(&self) -> Result<()>;

    /// Closes the session, rolling back a transaction that was left active.
    /// Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens new sessions, one per unit of work.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// The session type this factory opens.
    type Session: Session;

    /// Opens a fresh session.
    async fn open(&self) -> Result<Self::Session>;
}

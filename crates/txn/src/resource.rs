//! The transactional resource capability.

use async_trait::async_trait;
use thiserror::Error;

/// Boxed native error raised by a resource's underlying handle.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a single resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// `start` was called while the handle already had an open transaction.
    #[error("The {kind} transaction has already been started and can't be started twice")]
    AlreadyStarted { kind: &'static str },

    /// The underlying handle failed. The native error is kept unchanged.
    #[error(transparent)]
    Backend(BoxError),
}

impl ResourceError {
    /// Wraps a native handle error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        ResourceError::Backend(err.into())
    }

    /// Returns the native error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            ResourceError::Backend(err) => err.downcast_ref::<E>(),
            ResourceError::AlreadyStarted { .. } => None,
        }
    }
}

/// One external handle (a connection, a session) that can take part in a
/// transaction.
///
/// Implementations delegate straight to their handle and do not track
/// lifecycle state of their own; `TransactionContext` owns that. Each variant
/// decides what "already started" means for its handle, for example
/// auto-commit already being disabled on a connection.
#[async_trait]
pub trait TransactionalResource: Send {
    /// Short name of the resource variant, used in logs and errors.
    fn kind(&self) -> &'static str;

    /// Opens a transaction on the handle.
    async fn start(&mut self) -> Result<(), ResourceError>;

    /// Commits the handle's transaction.
    async fn commit(&mut self) -> Result<(), ResourceError>;

    /// Rolls back the handle's transaction.
    async fn rollback(&mut self) -> Result<(), ResourceError>;
}

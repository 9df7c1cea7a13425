//! The session variant of `TransactionalResource`.

use async_trait::async_trait;
use txn::{ResourceError, TransactionalResource};

use crate::session::Session;

/// Resource kind reported for sessions.
pub const KIND: &str = "session";

/// Makes a unit-of-work session take part in a transaction context.
#[derive(Debug, Clone)]
pub struct SessionResource<S> {
    session: S,
}

impl<S: Session> SessionResource<S> {
    /// Wraps a session.
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Returns the wrapped session.
    pub fn wrapped(&self) -> &S {
        &self.session
    }
}

#[async_trait]
impl<S: Session> TransactionalResource for SessionResource<S> {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn start(&mut self) -> Result<(), ResourceError> {
        if self.session.is_active().await {
            return Err(ResourceError::AlreadyStarted { kind: KIND });
        }
        self.session.begin().await.map_err(ResourceError::backend)
    }

    async fn commit(&mut self) -> Result<(), ResourceError> {
        self.session.commit().await.map_err(ResourceError::backend)
    }

    async fn rollback(&mut self) -> Result<(), ResourceError> {
        self.session.rollback().await.map_err(ResourceError::backend)
    }
}

//! Hands out the unit of work's session and registers it with the current
//! transaction.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use txn::{ResourceSource, TransactionContextManager, TransactionalResource};

use crate::error::Result;
use crate::resource::SessionResource;
use crate::session::{Session, SessionFactory};

/// Holds the session already opened for a unit of work.
#[derive(Debug, Clone)]
pub struct SessionSlot<S> {
    session: Arc<Mutex<Option<S>>>,
}

impl<S: Session> SessionSlot<S> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the session held by the slot, if any.
    pub async fn get(&self) -> Option<S> {
        self.session.lock().await.clone()
    }
}

impl<S: Session> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: Session> ResourceSource for SessionSlot<S> {
    async fn established(&self) -> Option<Box<dyn TransactionalResource>> {
        self.get()
            .await
            .map(|session| Box::new(SessionResource::new(session)) as Box<dyn TransactionalResource>)
    }
}

/// Lazily opens one session per unit of work.
///
/// The first call to `setup_session` opens a session, keeps it in the slot
/// and, if a transaction is active, adds it to that transaction. Later calls
/// return the same session.
pub struct SessionProvider<F: SessionFactory> {
    factory: Arc<F>,
    slot: SessionSlot<F::Session>,
    manager: TransactionContextManager,
}

impl<F: SessionFactory> Clone for SessionProvider<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            slot: self.slot.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<F: SessionFactory> std::fmt::Debug for SessionProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl<F: SessionFactory> SessionProvider<F> {
    /// Creates a provider for one unit of work.
    pub fn new(
        factory: Arc<F>,
        slot: SessionSlot<F::Session>,
        manager: TransactionContextManager,
    ) -> Self {
        Self {
            factory,
            slot,
            manager,
        }
    }

    /// Returns the unit of work's session, opening one on first use.
    ///
    /// A fresh session is only kept once it has joined the running
    /// transaction. If joining fails it is closed again.
    #[tracing::instrument(skip(self))]
    pub async fn setup_session(&self) -> Result<F::Session> {
        let mut slot = self.slot.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = self.factory.open().await?;
        tracing::debug!("session opened");

        if let Some(context) = self.manager.current().await {
            let joined = context
                .lock()
                .await
                .add(Box::new(SessionResource::new(session.clone())))
                .await;
            if let Err(err) = joined {
                if let Err(close_err) = session.close().await {
                    tracing::error!(error = %close_err, "unable to close a session that failed to join the transaction");
                }
                return Err(err.into());
            }
        }

        *slot = Some(session.clone());
        Ok(session)
    }

    /// Closes the unit of work's session. Does nothing when no session was
    /// opened.
    #[tracing::instrument(skip(self))]
    pub async fn teardown_session(&self) -> Result<()> {
        let session = self.slot.session.lock().await.take();
        if let Some(session) = session {
            session.close().await?;
            tracing::debug!("session closed");
        }
        Ok(())
    }
}

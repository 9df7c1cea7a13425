//! Per-unit-of-work registry of the active transaction context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::context::{SharedContext, TransactionContext};
use crate::error::{Result, TransactionError};
use crate::resource::TransactionalResource;

/// A place where a resource provider keeps the handle it already handed out
/// for the current unit of work.
///
/// When the manager starts a new context it asks every registered source for
/// such a handle, so work done before the transaction began joins it.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Returns a resource wrapping the already established handle, if any.
    async fn established(&self) -> Option<Box<dyn TransactionalResource>>;
}

/// Holds at most one active `TransactionContext` for a unit of work.
///
/// The manager is an explicit handle: create one per unit of work (a request,
/// a job) and pass clones to everything that participates in it. Clones share
/// the same slot. Independent units of work use independent managers and so
/// never see each other's transactions.
#[derive(Clone, Default)]
pub struct TransactionContextManager {
    current: Arc<Mutex<Option<SharedContext>>>,
    sources: Vec<Arc<dyn ResourceSource>>,
}

impl TransactionContextManager {
    /// Creates a manager with no resource sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source whose established handle is picked up by `start`.
    /// Sources are consulted in the order they were added.
    pub fn with_source(mut self, source: Arc<dyn ResourceSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Creates and registers a new context.
    ///
    /// Fails if a context is already registered. Handles already established
    /// by the registered sources are added to the new context.
    #[tracing::instrument(skip(self), fields(sources = self.sources.len()))]
    pub async fn start(&self) -> Result<SharedContext> {
        let mut context = TransactionContext::new();
        for source in &self.sources {
            if let Some(resource) = source.established().await {
                tracing::debug!(kind = resource.kind(), "discovered established resource");
                context.add(resource).await?;
            }
        }

        let mut current = self.slot();
        if current.is_some() {
            return Err(TransactionError::ContextActive);
        }

        tracing::debug!(context_id = %context.id(), "transaction context registered");
        let shared = context.shared();
        *current = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Returns the registered context, if any.
    pub async fn current(&self) -> Option<SharedContext> {
        self.slot().clone()
    }

    /// Returns true if a context is registered.
    pub async fn has_current(&self) -> bool {
        self.slot().is_some()
    }

    /// Clears the registration. Calling this with nothing registered is a
    /// no-op.
    pub async fn tear_down(&self) {
        self.clear();
    }

    /// Synchronous teardown, usable from `Drop`.
    pub(crate) fn clear(&self) {
        let removed = self.slot().take();
        if removed.is_some() {
            tracing::debug!("transaction context torn down");
        }
    }

    // The slot lock is never held across an await.
    fn slot(&self) -> MutexGuard<'_, Option<SharedContext>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TransactionContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContextManager")
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

//! The transaction context state machine.
//!
//! A `TransactionContext` aggregates every resource touched by one logical
//! unit of work and drives their start/commit/rollback without a shared
//! commit protocol. Atomicity across resources is best effort:
//!
//! - a failure of the *first* resource's commit rolls back the rest and is
//!   returned to the caller;
//! - a failure of any *later* resource's commit is logged and recorded in the
//!   `CommitReport`, because earlier resources are already durable;
//! - every resource always gets a rollback attempt, and rollback failures are
//!   aggregated into a single error.

use std::sync::Arc;
use std::time::Instant;

use common::ContextId;
use tokio::sync::Mutex;

use crate::error::{ResourceFailure, Result, TransactionError};
use crate::resource::TransactionalResource;
use crate::state::TransactionState;

/// A context shared between the demarcation wrapper and resource providers.
pub type SharedContext = Arc<Mutex<TransactionContext>>;

/// Outcome of a successful commit.
#[derive(Debug, Default)]
pub struct CommitReport {
    /// Number of resources whose commit succeeded.
    pub committed: usize,
    /// Non-first resources whose commit failed after earlier resources had
    /// already committed.
    pub partial_failures: Vec<ResourceFailure>,
}

impl CommitReport {
    /// Returns true if every resource committed.
    pub fn is_clean(&self) -> bool {
        self.partial_failures.is_empty()
    }
}

/// Tracks the resources and lifecycle of one logical transaction.
pub struct TransactionContext {
    id: ContextId,
    resources: Vec<Box<dyn TransactionalResource>>,
    started: bool,
    committed: bool,
    rolled_back: bool,
    rollback_only: bool,
}

impl TransactionContext {
    /// Creates an empty, not yet started context.
    pub fn new() -> Self {
        Self {
            id: ContextId::new(),
            resources: Vec::new(),
            started: false,
            committed: false,
            rolled_back: false,
            rollback_only: false,
        }
    }

    /// Wraps the context for sharing.
    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Returns the context ID.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns true once `start` has succeeded.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> TransactionState {
        if self.committed {
            TransactionState::Committed
        } else if self.rolled_back {
            TransactionState::RolledBack
        } else if self.started {
            TransactionState::Started
        } else {
            TransactionState::NotStarted
        }
    }

    /// Returns the number of resources still pending commit or rollback.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn is_completed(&self) -> bool {
        self.committed || self.rolled_back
    }

    /// Registers a resource with the transaction.
    ///
    /// If the context is already started the resource is started right away
    /// so it joins the running transaction. A resource whose start fails is
    /// not registered.
    #[tracing::instrument(skip(self, resource), fields(context_id = %self.id, kind = resource.kind()))]
    pub async fn add(&mut self, mut resource: Box<dyn TransactionalResource>) -> Result<()> {
        if self.is_completed() {
            return Err(TransactionError::Completed {
                state: self.state(),
                action: "add resources",
            });
        }

        if self.started {
            let kind = resource.kind();
            resource
                .start()
                .await
                .map_err(|source| TransactionError::Start { kind, source })?;
            tracing::debug!("resource joined running transaction");
        }

        self.resources.push(resource);
        Ok(())
    }

    /// Starts every registered resource in registration order.
    ///
    /// On the first failure the resources already started by this call are
    /// rolled back, the context is marked rolled back and the start failure
    /// is returned.
    #[tracing::instrument(skip(self), fields(context_id = %self.id, resources = self.resources.len()))]
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(TransactionError::AlreadyStarted);
        }
        if self.is_completed() {
            return Err(TransactionError::Completed {
                state: self.state(),
                action: "start",
            });
        }

        for index in 0..self.resources.len() {
            if let Err(source) = self.resources[index].start().await {
                let kind = self.resources[index].kind();
                self.rolled_back = true;

                for (started_index, resource) in self.resources[..index].iter_mut().enumerate() {
                    if let Err(error) = resource.rollback().await {
                        metrics::counter!("txn_rollback_failures_total").increment(1);
                        tracing::error!(
                            index = started_index,
                            kind = resource.kind(),
                            %error,
                            "unable to roll back a resource after another resource failed to start"
                        );
                    }
                }

                metrics::counter!("txn_rollbacks_total").increment(1);
                tracing::warn!(index, kind, error = %source, "transaction failed to start");
                return Err(TransactionError::Start { kind, source });
            }
        }

        self.started = true;
        metrics::counter!("txn_started_total").increment(1);
        tracing::debug!("transaction started");
        Ok(())
    }

    /// Commits every resource in registration order.
    ///
    /// Committing an already committed context is a no-op. If the first
    /// resource fails, the remaining resources are rolled back and its error
    /// is returned. Failures of later resources cannot be undone, so they are
    /// logged, recorded in the returned report, and the context still ends up
    /// committed.
    #[tracing::instrument(skip(self), fields(context_id = %self.id, resources = self.resources.len()))]
    pub async fn commit(&mut self) -> Result<CommitReport> {
        if !self.started {
            return Err(TransactionError::NotStarted {
                action: "commit it",
            });
        }
        if self.committed {
            return Ok(CommitReport::default());
        }
        if self.rolled_back {
            return Err(TransactionError::AlreadyRolledBack);
        }
        if self.rollback_only {
            return Err(TransactionError::RollbackOnly);
        }

        let commit_start = Instant::now();
        let mut report = CommitReport::default();
        let mut pending = std::mem::take(&mut self.resources).into_iter();
        let mut index = 0;

        while let Some(mut resource) = pending.next() {
            let kind = resource.kind();
            match resource.commit().await {
                Ok(()) => report.committed += 1,
                Err(source) if index == 0 => {
                    self.resources = pending.collect();
                    if let Err(error) = self.rollback().await {
                        tracing::error!(
                            %error,
                            "the first resource failed to commit and rolling back the remaining resources also failed"
                        );
                    }
                    tracing::warn!(kind, error = %source, "transaction failed to commit");
                    return Err(TransactionError::Commit { kind, source });
                }
                Err(error) => {
                    metrics::counter!("txn_partial_commit_failures_total").increment(1);
                    tracing::error!(
                        index,
                        kind,
                        %error,
                        "a resource failed to commit after earlier resources committed; \
                         without two-phase commit they can't be undone, so the commit continues"
                    );
                    report
                        .partial_failures
                        .push(ResourceFailure { index, kind, error });
                }
            }
            index += 1;
        }

        self.committed = true;
        metrics::counter!("txn_commits_total").increment(1);
        metrics::histogram!("txn_commit_duration_seconds")
            .record(commit_start.elapsed().as_secs_f64());
        tracing::debug!(committed = report.committed, "transaction committed");
        Ok(report)
    }

    /// Rolls back every resource.
    ///
    /// Rolling back an already rolled back context is a no-op. Every resource
    /// gets an attempt even if earlier ones fail; the context is marked
    /// rolled back regardless and any failures are returned together.
    #[tracing::instrument(skip(self), fields(context_id = %self.id, resources = self.resources.len()))]
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.started {
            return Err(TransactionError::NotStarted {
                action: "roll it back",
            });
        }
        if self.rolled_back {
            return Ok(());
        }
        if self.committed {
            return Err(TransactionError::AlreadyCommitted);
        }

        let mut failures = Vec::new();
        for (index, mut resource) in std::mem::take(&mut self.resources).into_iter().enumerate() {
            if let Err(error) = resource.rollback().await {
                metrics::counter!("txn_rollback_failures_total").increment(1);
                tracing::error!(
                    index,
                    kind = resource.kind(),
                    rollback_only = self.rollback_only,
                    %error,
                    "a resource failed to roll back"
                );
                failures.push(ResourceFailure {
                    index,
                    kind: resource.kind(),
                    error,
                });
            }
        }

        self.rolled_back = true;
        metrics::counter!("txn_rollbacks_total").increment(1);

        if failures.is_empty() {
            tracing::debug!("transaction rolled back");
            Ok(())
        } else {
            Err(TransactionError::Rollback { failures })
        }
    }

    /// Returns whether the transaction is marked rollback-only.
    pub fn is_rollback_only(&self) -> Result<bool> {
        self.ensure_active("check the rollback-only status")?;
        Ok(self.rollback_only)
    }

    /// Marks the transaction so that it can only be rolled back.
    pub fn set_rollback_only(&mut self) -> Result<()> {
        self.ensure_active("set the rollback-only status")?;
        if !self.rollback_only {
            tracing::warn!(context_id = %self.id, "transaction marked rollback-only");
        }
        self.rollback_only = true;
        Ok(())
    }

    fn ensure_active(&self, action: &'static str) -> Result<()> {
        if !self.started {
            return Err(TransactionError::NotStarted { action });
        }
        if self.is_completed() {
            return Err(TransactionError::Completed {
                state: self.state(),
                action,
            });
        }
        Ok(())
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&'static str> = self.resources.iter().map(|r| r.kind()).collect();
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("rollback_only", &self.rollback_only)
            .field("resources", &kinds)
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.started && !self.is_completed() && !self.resources.is_empty() {
            tracing::warn!(
                context_id = %self.id,
                resources = self.resources.len(),
                "transaction context dropped while still active"
            );
        }
    }
}

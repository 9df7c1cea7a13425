//! In-memory transactional resource for testing.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::{ResourceError, TransactionalResource};

/// Error raised by an `InMemoryResource` configured to fail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("simulated {operation} failure in resource '{name}'")]
pub struct SimulatedFailure {
    pub name: String,
    pub operation: &'static str,
}

/// Ordered log of resource calls shared between several resources.
///
/// Entries read `"<name>:<operation>"`, e.g. `"a:commit"`.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<RwLock<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all entries in call order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.read().unwrap().clone()
    }

    /// Returns the entries for one operation, in call order.
    pub fn calls(&self, operation: &str) -> Vec<String> {
        let suffix = format!(":{operation}");
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|entry| entry.ends_with(&suffix))
            .cloned()
            .collect()
    }

    fn record(&self, name: &str, operation: &str) {
        self.entries
            .write()
            .unwrap()
            .push(format!("{name}:{operation}"));
    }
}

#[derive(Debug, Default)]
struct InMemoryResourceState {
    active: bool,
    fail_on_start: bool,
    fail_on_commit: bool,
    fail_on_rollback: bool,
    commits: u32,
    rollbacks: u32,
}

/// In-memory resource that records every call in a `Journal`.
///
/// Clones share state, so a test can keep one clone for assertions while
/// the context owns another.
#[derive(Debug, Clone)]
pub struct InMemoryResource {
    name: String,
    journal: Journal,
    state: Arc<RwLock<InMemoryResourceState>>,
}

impl InMemoryResource {
    /// Creates a resource with its own journal.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_journal(name, Journal::new())
    }

    /// Creates a resource that records into a shared journal.
    pub fn with_journal(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            journal,
            state: Arc::default(),
        }
    }

    /// Returns the resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the journal this resource records into.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Configures the resource to fail on `start`.
    pub fn set_fail_on_start(&self, fail: bool) {
        self.state.write().unwrap().fail_on_start = fail;
    }

    /// Configures the resource to fail on `commit`.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().unwrap().fail_on_commit = fail;
    }

    /// Configures the resource to fail on `rollback`.
    pub fn set_fail_on_rollback(&self, fail: bool) {
        self.state.write().unwrap().fail_on_rollback = fail;
    }

    /// Returns true while a transaction is open on the resource.
    pub fn is_active(&self) -> bool {
        self.state.read().unwrap().active
    }

    /// Returns the number of successful commits.
    pub fn commit_count(&self) -> u32 {
        self.state.read().unwrap().commits
    }

    /// Returns the number of successful rollbacks.
    pub fn rollback_count(&self) -> u32 {
        self.state.read().unwrap().rollbacks
    }

    fn failure(&self, operation: &'static str) -> ResourceError {
        ResourceError::backend(SimulatedFailure {
            name: self.name.clone(),
            operation,
        })
    }
}

#[async_trait]
impl TransactionalResource for InMemoryResource {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn start(&mut self) -> Result<(), ResourceError> {
        self.journal.record(&self.name, "start");
        let mut state = self.state.write().unwrap();

        if state.active {
            return Err(ResourceError::AlreadyStarted { kind: "memory" });
        }
        if state.fail_on_start {
            return Err(self.failure("start"));
        }

        state.active = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), ResourceError> {
        self.journal.record(&self.name, "commit");
        let mut state = self.state.write().unwrap();

        if state.fail_on_commit {
            return Err(self.failure("commit"));
        }

        state.active = false;
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ResourceError> {
        self.journal.record(&self.name, "rollback");
        let mut state = self.state.write().unwrap();

        if state.fail_on_rollback {
            return Err(self.failure("rollback"));
        }

        state.active = false;
        state.rollbacks += 1;
        Ok(())
    }
}

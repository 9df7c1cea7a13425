//! In-memory session store for testing and demos.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SessionError};
use crate::session::{Session, SessionFactory};

/// Committed key/value data shared by every session opened on the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the committed value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().unwrap().get(key).cloned()
    }

    /// Returns the number of committed entries.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Returns true if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    fn apply(&self, writes: Vec<Write>) {
        let mut data = self.data.write().unwrap();
        for write in writes {
            match write {
                Write::Put(key, value) => {
                    data.insert(key, value);
                }
                Write::Remove(key) => {
                    data.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl SessionFactory for InMemoryStore {
    type Session = InMemorySession;

    async fn open(&self) -> Result<InMemorySession> {
        Ok(InMemorySession::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
enum Write {
    Put(String, String),
    Remove(String),
}

#[derive(Debug, Default)]
struct InMemorySessionState {
    active: bool,
    closed: bool,
    staged: Vec<Write>,
    fail_on_begin: bool,
    fail_on_commit: bool,
    fail_on_rollback: bool,
    commits: u32,
    rollbacks: u32,
}

/// Session over an `InMemoryStore`.
///
/// Outside a transaction writes go straight to the store. Inside one they are
/// staged: reads see them, the store only does once the transaction commits,
/// and a rollback discards them. Clones share state.
#[derive(Debug, Clone)]
pub struct InMemorySession {
    store: InMemoryStore,
    state: Arc<RwLock<InMemorySessionState>>,
}

impl InMemorySession {
    /// Opens a session on `store`.
    pub fn new(store: InMemoryStore) -> Self {
        Self {
            store,
            state: Arc::default(),
        }
    }

    /// Returns the store this session writes to.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Writes `value` under `key`.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.write(Write::Put(key.into(), value.into()))
    }

    /// Removes `key`.
    pub fn remove(&self, key: impl Into<String>) -> Result<()> {
        self.write(Write::Remove(key.into()))
    }

    /// Reads `key`, including writes staged by the active transaction.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.read().unwrap();
        if state.closed {
            return Err(SessionError::Closed);
        }

        let staged = state.staged.iter().rev().find_map(|write| match write {
            Write::Put(k, value) if k == key => Some(Some(value.clone())),
            Write::Remove(k) if k == key => Some(None),
            _ => None,
        });
        Ok(staged.unwrap_or_else(|| self.store.get(key)))
    }

    /// Returns the number of writes staged by the active transaction.
    pub fn staged_count(&self) -> usize {
        self.state.read().unwrap().staged.len()
    }

    /// Returns true once the session was closed.
    pub fn is_closed(&self) -> bool {
        self.state.read().unwrap().closed
    }

    /// Returns how many transactions were committed.
    pub fn commit_count(&self) -> u32 {
        self.state.read().unwrap().commits
    }

    /// Returns how many transactions were rolled back.
    pub fn rollback_count(&self) -> u32 {
        self.state.read().unwrap().rollbacks
    }

    /// Configures the session to fail on `begin`.
    pub fn set_fail_on_begin(&self, fail: bool) {
        self.state.write().unwrap().fail_on_begin = fail;
    }

    /// Configures the session to fail on `commit`. The staged writes are
    /// discarded and the transaction ends.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().unwrap().fail_on_commit = fail;
    }

    /// Configures the session to fail on `rollback`. The staged writes are
    /// still discarded.
    pub fn set_fail_on_rollback(&self, fail: bool) {
        self.state.write().unwrap().fail_on_rollback = fail;
    }

    fn write(&self, write: Write) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.closed {
            return Err(SessionError::Closed);
        }

        if state.active {
            state.staged.push(write);
        } else {
            self.store.apply(vec![write]);
        }
        Ok(())
    }

    fn end(&self, ending: Ending) -> Result<Vec<Write>> {
        let action = ending.as_str();
        let mut state = self.state.write().unwrap();
        if state.closed {
            return Err(SessionError::Closed);
        }
        if !state.active {
            return Err(SessionError::NotActive { action });
        }

        state.active = false;
        let staged = std::mem::take(&mut state.staged);
        let fail = match ending {
            Ending::Commit => state.fail_on_commit,
            Ending::Rollback => state.fail_on_rollback,
        };
        if fail {
            return Err(SessionError::Simulated { operation: action });
        }

        match ending {
            Ending::Commit => state.commits += 1,
            Ending::Rollback => state.rollbacks += 1,
        }
        Ok(staged)
    }
}

#[derive(Debug, Clone, Copy)]
enum Ending {
    Commit,
    Rollback,
}

impl Ending {
    fn as_str(self) -> &'static str {
        match self {
            Ending::Commit => "commit",
            Ending::Rollback => "rollback",
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn is_active(&self) -> bool {
        self.state.read().unwrap().active
    }

    async fn begin(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.closed {
            return Err(SessionError::Closed);
        }
        if state.active {
            return Err(SessionError::AlreadyActive);
        }
        if state.fail_on_begin {
            return Err(SessionError::Simulated { operation: "begin" });
        }

        state.active = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let staged = self.end(Ending::Commit)?;
        self.store.apply(staged);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.end(Ending::Rollback).map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let outcome = if self.is_active().await {
            tracing::warn!("session closed with an active transaction; rolling back");
            self.rollback().await
        } else {
            Ok(())
        };
        self.state.write().unwrap().closed = true;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_outside_transaction_apply_immediately() {
        let store = InMemoryStore::new();
        let session = store.open().await.unwrap();

        session.put("a", "1").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));

        session.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = InMemoryStore::new();
        let session = InMemorySession::new(store.clone());

        session.begin().await.unwrap();
        session.put("a", "1").unwrap();
        session.put("b", "2").unwrap();
        session.remove("b").unwrap();

        assert!(store.is_empty());
        assert_eq!(session.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(session.get("b").unwrap(), None);
        assert_eq!(session.staged_count(), 3);

        session.commit().await.unwrap();
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.get("b"), None);
        assert_eq!(store.len(), 1);
        assert!(!session.is_active().await);
        assert_eq!(session.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = InMemoryStore::new();
        let session = InMemorySession::new(store.clone());
        session.put("a", "before").unwrap();

        session.begin().await.unwrap();
        session.put("a", "after").unwrap();
        session.rollback().await.unwrap();

        assert_eq!(store.get("a").as_deref(), Some("before"));
        assert_eq!(session.staged_count(), 0);
        assert_eq!(session.rollback_count(), 1);
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let session = InMemorySession::new(InMemoryStore::new());
        session.begin().await.unwrap();

        let err = session.begin().await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyActive));
    }

    #[tokio::test]
    async fn test_commit_without_transaction_fails() {
        let session = InMemorySession::new(InMemoryStore::new());

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, SessionError::NotActive { action: "commit" }));
    }

    #[tokio::test]
    async fn test_fail_on_commit_discards_and_ends_transaction() {
        let store = InMemoryStore::new();
        let session = InMemorySession::new(store.clone());
        session.set_fail_on_commit(true);

        session.begin().await.unwrap();
        session.put("a", "1").unwrap();
        let err = session.commit().await.unwrap_err();

        assert!(matches!(err, SessionError::Simulated { operation: "commit" }));
        assert!(store.is_empty());
        assert!(!session.is_active().await);
    }

    #[tokio::test]
    async fn test_fail_on_begin() {
        let session = InMemorySession::new(InMemoryStore::new());
        session.set_fail_on_begin(true);

        assert!(session.begin().await.is_err());
        assert!(!session.is_active().await);
    }

    #[tokio::test]
    async fn test_close_rolls_back_active_transaction() {
        let store = InMemoryStore::new();
        let session = InMemorySession::new(store.clone());

        session.begin().await.unwrap();
        session.put("a", "1").unwrap();
        session.close().await.unwrap();

        assert!(session.is_closed());
        assert!(store.is_empty());
        assert!(matches!(session.put("a", "1"), Err(SessionError::Closed)));
        assert!(matches!(session.get("a"), Err(SessionError::Closed)));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_share_committed_data() {
        let store = InMemoryStore::new();
        let first = store.open().await.unwrap();
        let second = store.open().await.unwrap();

        first.begin().await.unwrap();
        first.put("a", "1").unwrap();
        assert_eq!(second.get("a").unwrap(), None);

        first.commit().await.unwrap();
        assert_eq!(second.get("a").unwrap().as_deref(), Some("1"));
    }
}

//! End-to-end tests for coordinating several resources through the manager
//! and the demarcation wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use txn::{
    InMemoryResource, Journal, ResourceSource, TransactionContextManager, TransactionError,
    TransactionState, Transactional, TransactionalResource, transactional,
};

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Hands out one lazily created resource per unit of work and registers it
/// with the current transaction the first time it is handed out.
#[derive(Clone)]
struct LazyProvider {
    name: &'static str,
    journal: Journal,
    manager: TransactionContextManager,
    slot: Arc<Mutex<Option<InMemoryResource>>>,
}

impl LazyProvider {
    fn new(name: &'static str, journal: Journal, manager: TransactionContextManager) -> Self {
        Self {
            name,
            journal,
            manager,
            slot: Arc::default(),
        }
    }

    async fn acquire(&self) -> Result<InMemoryResource, TransactionError> {
        let mut slot = self.slot.lock().await;
        if let Some(resource) = slot.as_ref() {
            return Ok(resource.clone());
        }

        let resource = InMemoryResource::with_journal(self.name, self.journal.clone());
        *slot = Some(resource.clone());
        drop(slot);

        if let Some(context) = self.manager.current().await {
            context.lock().await.add(Box::new(resource.clone())).await?;
        }
        Ok(resource)
    }
}

struct SlotSource(Arc<Mutex<Option<InMemoryResource>>>);

#[async_trait]
impl ResourceSource for SlotSource {
    async fn established(&self) -> Option<Box<dyn TransactionalResource>> {
        self.0
            .lock()
            .await
            .clone()
            .map(|r| Box::new(r) as Box<dyn TransactionalResource>)
    }
}

#[tokio::test]
async fn test_lazily_registered_resources_commit_together() {
    let journal = Journal::new();
    let manager = TransactionContextManager::new();
    let db = LazyProvider::new("db", journal.clone(), manager.clone());
    let session = LazyProvider::new("session", journal.clone(), manager.clone());

    transactional(&manager, || async {
        db.acquire().await?;
        session.acquire().await?;
        db.acquire().await?;
        Ok::<_, ServiceError>(())
    })
    .await
    .unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            "db:start",
            "session:start",
            "db:commit",
            "session:commit"
        ]
    );
}

#[tokio::test]
async fn test_established_handle_is_discovered_on_start() {
    let journal = Journal::new();
    let slot: Arc<Mutex<Option<InMemoryResource>>> = Arc::default();
    let manager =
        TransactionContextManager::new().with_source(Arc::new(SlotSource(Arc::clone(&slot))));
    let db = LazyProvider {
        name: "db",
        journal: journal.clone(),
        manager: manager.clone(),
        slot,
    };

    // Acquired outside any transaction: nothing to register with yet.
    let early = db.acquire().await.unwrap();
    assert!(!early.is_active());

    transactional(&manager, || async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();

    assert_eq!(journal.entries(), vec!["db:start", "db:commit"]);
}

#[tokio::test]
async fn test_failure_in_nested_service_rolls_back_everything_once() {
    let journal = Journal::new();
    let manager = TransactionContextManager::new();
    let db = LazyProvider::new("db", journal.clone(), manager.clone());
    let session = LazyProvider::new("session", journal.clone(), manager.clone());

    let withdraw = || async {
        db.acquire().await?;
        Err::<(), _>(ServiceError::InsufficientFunds)
    };

    let result = transactional(&manager, || async {
        session.acquire().await?;
        // The caller handles the nested failure and carries on, but the
        // transaction is already doomed.
        let nested = Transactional::new(&manager).run(withdraw).await;
        assert!(matches!(nested, Err(ServiceError::InsufficientFunds)));

        let context = manager.current().await.unwrap();
        assert!(context.lock().await.is_rollback_only()?);
        Ok::<_, ServiceError>("handled")
    })
    .await;

    assert_eq!(result.unwrap(), "handled");
    assert!(journal.calls("commit").is_empty());
    assert_eq!(
        journal.calls("rollback"),
        vec!["session:rollback", "db:rollback"]
    );
    assert_eq!(journal.calls("start"), vec!["session:start", "db:start"]);
}

#[tokio::test]
async fn test_partial_commit_failure_is_not_reported_to_caller() {
    let journal = Journal::new();
    let a = InMemoryResource::with_journal("a", journal.clone());
    let b = InMemoryResource::with_journal("b", journal.clone());
    let c = InMemoryResource::with_journal("c", journal.clone());
    b.set_fail_on_commit(true);

    let manager = TransactionContextManager::new();
    let context = manager.start().await.unwrap();
    {
        let mut context = context.lock().await;
        for resource in [&a, &b, &c] {
            context.add(Box::new(resource.clone())).await.unwrap();
        }
    }

    transactional(&manager, || async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap();

    assert_eq!(journal.calls("commit"), vec!["a:commit", "b:commit", "c:commit"]);
    assert_eq!(context.lock().await.state(), TransactionState::Committed);
    assert_eq!(a.commit_count(), 1);
    assert_eq!(c.commit_count(), 1);
}

#[tokio::test]
async fn test_first_commit_failure_reaches_caller() {
    let journal = Journal::new();
    let a = InMemoryResource::with_journal("a", journal.clone());
    let b = InMemoryResource::with_journal("b", journal.clone());
    a.set_fail_on_commit(true);

    let manager = TransactionContextManager::new();
    let context = manager.start().await.unwrap();
    {
        let mut context = context.lock().await;
        context.add(Box::new(a.clone())).await.unwrap();
        context.add(Box::new(b.clone())).await.unwrap();
    }

    let err = transactional(&manager, || async { Ok::<_, ServiceError>(()) })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Transaction(TransactionError::Commit { .. })
    ));
    assert_eq!(journal.calls("rollback"), vec!["b:rollback"]);
    assert_eq!(context.lock().await.state(), TransactionState::RolledBack);
}

#[tokio::test]
async fn test_concurrent_units_of_work_are_isolated() {
    let journal = Journal::new();

    let mut handles = Vec::new();
    for i in 0..4 {
        let journal = journal.clone();
        handles.push(tokio::spawn(async move {
            let manager = TransactionContextManager::new();
            let db = LazyProvider::new("db", journal, manager.clone());
            transactional(&manager, || async {
                db.acquire().await?;
                if i % 2 == 0 {
                    Ok::<(), ServiceError>(())
                } else {
                    Err(ServiceError::InsufficientFunds)
                }
            })
            .await
        }));
    }

    let mut failures = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            failures += 1;
        }
    }

    assert_eq!(failures, 2);
    assert_eq!(journal.calls("commit").len(), 2);
    assert_eq!(journal.calls("rollback").len(), 2);
}

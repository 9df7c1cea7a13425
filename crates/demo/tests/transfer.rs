//! Transfer integration tests against a PostgreSQL container.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p demo --test transfer -- --test-threads=1
//! ```

use std::sync::Arc;

use demo::{Bank, DemoError};
use serial_test::serial;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use txn_session::InMemoryStore;
use txn_sql::DatabaseConfig;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                connection_string: format!(
                    "postgres://postgres:postgres@{}:{}/postgres",
                    host, port
                ),
            })
        })
        .await
        .clone()
}

async fn get_test_bank() -> Bank {
    let info = get_container_info().await;
    let config = DatabaseConfig {
        url: info.connection_string.clone(),
        ..DatabaseConfig::default()
    };

    let bank = Bank::new(config.connect().await.unwrap(), InMemoryStore::new());
    bank.migrate().await.unwrap();
    bank.open_account(1, 100).await.unwrap();
    bank.open_account(2, 0).await.unwrap();
    bank
}

#[tokio::test]
#[serial]
async fn test_transfer_commits_balances_and_journal() {
    let bank = get_test_bank().await;

    let receipt = bank.transfer(1, 2, 40).await.unwrap();

    assert_eq!(bank.balance(1).await.unwrap(), 60);
    assert_eq!(bank.balance(2).await.unwrap(), 40);
    assert_eq!(receipt.journal_key, format!("transfer:{}", receipt.context_id));
    assert_eq!(
        bank.journal().get(&receipt.journal_key).as_deref(),
        Some("1->2:40")
    );
}

#[tokio::test]
#[serial]
async fn test_insufficient_funds_rolls_back_everything() {
    let bank = get_test_bank().await;

    let err = bank.transfer(2, 1, 10).await.unwrap_err();

    assert!(matches!(
        err,
        DemoError::InsufficientFunds {
            account: 2,
            balance: 0,
            requested: 10
        }
    ));
    assert_eq!(bank.balance(1).await.unwrap(), 100);
    assert!(bank.journal().is_empty());
}

#[tokio::test]
#[serial]
async fn test_unknown_destination_rolls_back_debit() {
    let bank = get_test_bank().await;

    let err = bank.transfer(1, 99, 10).await.unwrap_err();

    assert!(matches!(err, DemoError::AccountNotFound(99)));
    assert_eq!(bank.balance(1).await.unwrap(), 100);
    assert!(bank.journal().is_empty());
}

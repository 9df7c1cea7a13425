//! Demo entry point.

use demo::{Bank, Config, DemoError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use txn_session::InMemoryStore;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect and prepare the accounts
    let pool = config
        .database
        .connect()
        .await
        .expect("failed to connect to the database");
    let bank = Bank::new(pool, InMemoryStore::new());
    bank.migrate().await.expect("failed to create the schema");
    bank.open_account(1, 100).await.expect("failed to open account 1");
    bank.open_account(2, 0).await.expect("failed to open account 2");

    // 4. One transfer that commits, one that rolls back
    match bank.transfer(1, 2, 40).await {
        Ok(receipt) => tracing::info!(
            receipt = %serde_json::to_string(&receipt).unwrap_or_default(),
            "first transfer done"
        ),
        Err(err) => tracing::error!(error = %err, "first transfer failed"),
    }

    match bank.transfer(2, 1, 1_000).await {
        Err(DemoError::InsufficientFunds { .. }) => {
            tracing::info!("second transfer rolled back as expected");
        }
        other => tracing::warn!(?other, "second transfer should have been rejected"),
    }

    // 5. Report
    let from = bank.balance(1).await.expect("failed to read account 1");
    let to = bank.balance(2).await.expect("failed to read account 2");
    tracing::info!(from, to, journal_entries = bank.journal().len(), "final balances");
    tracing::info!("metrics:\n{}", metrics_handle.render());
}

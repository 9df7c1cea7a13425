//! Transfer demo wiring the coordinator to PostgreSQL and a journal session.

pub mod bank;
pub mod config;
pub mod error;

pub use bank::{Bank, TransferReceipt};
pub use config::Config;
pub use error::{DemoError, Result};

//! PostgreSQL connections as transactional resources.
//!
//! A [`ConnectionProvider`] hands out one pooled connection per unit of work
//! and registers it with the unit of work's current transaction; the
//! [`ConnectionResource`] then lets the transaction context open, commit and
//! roll back a transaction on it.

pub mod config;
pub mod error;
pub mod handle;
pub mod provider;
pub mod resource;

pub use config::DatabaseConfig;
pub use error::{Result, SqlError};
pub use handle::PgConnectionHandle;
pub use provider::{ConnectionProvider, ConnectionSlot};
pub use resource::{ConnectionResource, KIND};

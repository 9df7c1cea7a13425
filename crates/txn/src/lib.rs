//! Transaction coordination across heterogeneous transactional resources.
//!
//! This crate groups any number of resources (a database connection, an ORM
//! session, ...) under one logical unit of work and provides declarative
//! demarcation for running application code inside it:
//!
//! - [`TransactionalResource`]: the capability every resource variant
//!   implements (start / commit / rollback).
//! - [`TransactionContext`]: the state machine driving the resources of one
//!   transaction, with best-effort atomicity in place of two-phase commit.
//! - [`TransactionContextManager`]: the per-unit-of-work slot holding the
//!   active context.
//! - [`Transactional`]: the wrapper that decides, per call, whether to
//!   start/commit/roll back or only mark an outer transaction rollback-only.

pub mod context;
pub mod demarcation;
pub mod error;
pub mod manager;
pub mod memory;
pub mod policy;
pub mod resource;
pub mod state;

pub use common::ContextId;
pub use context::{CommitReport, SharedContext, TransactionContext};
pub use demarcation::{Transactional, transactional};
pub use error::{ResourceFailure, Result, TransactionError};
pub use manager::{ResourceSource, TransactionContextManager};
pub use memory::{InMemoryResource, Journal, SimulatedFailure};
pub use policy::{NeverRollback, OutcomePolicy, RollbackOnError, RollbackWhen};
pub use resource::{BoxError, ResourceError, TransactionalResource};
pub use state::TransactionState;

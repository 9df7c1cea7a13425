//! Unit-of-work sessions as transactional resources.
//!
//! A [`SessionProvider`] opens one [`Session`] per unit of work and
//! registers it with the unit of work's current transaction. The
//! [`InMemorySession`] stages writes inside its transaction and applies them
//! to an [`InMemoryStore`] on commit.

pub mod error;
pub mod memory;
pub mod provider;
pub mod resource;
pub mod session;

pub use error::{Result, SessionError};
pub use memory::{InMemorySession, InMemoryStore};
pub use provider::{SessionProvider, SessionSlot};
pub use resource::{KIND, SessionResource};
pub use session::{Session, SessionFactory};

pub mod types;

pub use types::ContextId;

use serde::Serialize;
use uuid::Uuid;

/// Identifier of one logical transaction context.
///
/// Every `TransactionContext` gets a fresh id when the manager creates it, so
/// log lines emitted by nested calls and by resource providers can be
/// correlated to the unit of work they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Creates a new random context ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a context ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ContextId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ContextId> for Uuid {
    fn from(id: ContextId) -> Self {
        id.0
    }
}

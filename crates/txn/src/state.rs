//! Transaction lifecycle states.

/// The observable state of a transaction context.
///
/// State transitions:
/// ```text
/// NotStarted ──► Started ──┬──► Committed
///                          └──► RolledBack
/// NotStarted ──(start failure)──► RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionState {
    /// Resources may be queued but none have been started.
    #[default]
    NotStarted,

    /// All registered resources have an open transaction.
    Started,

    /// Every resource was processed by a commit (terminal state).
    Committed,

    /// The transaction was rolled back (terminal state).
    RolledBack,
}

impl TransactionState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::NotStarted => "NotStarted",
            TransactionState::Started => "Started",
            TransactionState::Committed => "Committed",
            TransactionState::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_not_started() {
        assert_eq!(TransactionState::default(), TransactionState::NotStarted);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionState::NotStarted.is_terminal());
        assert!(!TransactionState::Started.is_terminal());
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionState::NotStarted.to_string(), "NotStarted");
        assert_eq!(TransactionState::Started.to_string(), "Started");
        assert_eq!(TransactionState::Committed.to_string(), "Committed");
        assert_eq!(TransactionState::RolledBack.to_string(), "RolledBack");
    }
}

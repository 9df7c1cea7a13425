//! Outcome policies deciding whether an operation's outcome forces a rollback.

/// Decides from an operation's outcome whether its transaction must roll back.
///
/// A policy is evaluated once per demarcated call and must not keep state
/// between calls.
pub trait OutcomePolicy<T, E>: Send + Sync {
    /// Returns true if the outcome should cause a rollback.
    fn should_rollback(&self, outcome: &Result<T, E>) -> bool;
}

/// Rolls back whenever the operation returns an error and never on success.
///
/// This is the policy used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOnError;

impl<T, E> OutcomePolicy<T, E> for RollbackOnError {
    fn should_rollback(&self, outcome: &Result<T, E>) -> bool {
        outcome.is_err()
    }
}

/// Never asks for a rollback. An outer rollback-only mark still applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRollback;

impl<T, E> OutcomePolicy<T, E> for NeverRollback {
    fn should_rollback(&self, _outcome: &Result<T, E>) -> bool {
        false
    }
}

/// Custom policy built from a predicate over the outcome.
///
/// ```
/// use txn::{OutcomePolicy, RollbackWhen};
///
/// // Roll back when the operation reports that nothing was written.
/// let policy = RollbackWhen(|outcome: &Result<u64, String>| matches!(outcome, Ok(0) | Err(_)));
/// let empty: Result<u64, String> = Ok(0);
/// let written: Result<u64, String> = Ok(3);
/// assert!(policy.should_rollback(&empty));
/// assert!(!policy.should_rollback(&written));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RollbackWhen<F>(pub F);

impl<T, E, F> OutcomePolicy<T, E> for RollbackWhen<F>
where
    F: Fn(&Result<T, E>) -> bool + Send + Sync,
{
    fn should_rollback(&self, outcome: &Result<T, E>) -> bool {
        (self.0)(outcome)
    }
}

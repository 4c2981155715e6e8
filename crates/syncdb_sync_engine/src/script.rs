//! Hook for scripts delivered through discovery.

use std::error::Error;

/// Boxed error returned by a script evaluator.
pub type ScriptError = Box<dyn Error + Send + Sync>;

/// Runs a script payload found in this node's own discovery entry.
///
/// Called at most once per sync round, only for non-empty payloads.
/// Failures are logged by the engine and never abort the round.
pub trait ScriptEvaluator: Send + Sync {
    /// Evaluates `payload`.
    fn evaluate(&self, payload: &str) -> Result<(), ScriptError>;
}

impl<F> ScriptEvaluator for F
where
    F: Fn(&str) -> Result<(), ScriptError> + Send + Sync,
{
    fn evaluate(&self, payload: &str) -> Result<(), ScriptError> {
        self(payload)
    }
}

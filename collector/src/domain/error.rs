//! Per-notification processing errors

use thiserror::Error;

/// Errors isolated to a single change notification
///
/// None of these stop the dispatch loop; the notification is logged and
/// skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The bus reported a lifecycle state outside the known set
    #[error("Unrecognized unit state: {0}")]
    UnrecognizedState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_state_display() {
        let err = PipelineError::UnrecognizedState("\"maintenance\"".to_string());
        assert_eq!(err.to_string(), "Unrecognized unit state: \"maintenance\"");
    }
}

//! Command error types.

use event_store::{EventStoreError, StreamId, Version};
use thiserror::Error;

/// Errors reported to command callers.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The stream moved on since the command's state was read.
    #[error("Concurrency conflict on stream {stream_id}: expected version {expected}, actual {actual}")]
    ConcurrencyConflict {
        stream_id: StreamId,
        expected: Version,
        actual: Version,
    },

    /// No handler in the pipeline completed the command.
    #[error("Unhandled command: {kind}")]
    Unhandled { kind: String },

    /// The aggregate refused the command.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The command payload does not match its kind.
    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    /// A handler tried to complete, or continue, an already completed command.
    #[error("Command context already completed")]
    AlreadyCompleted,

    /// The event store failed.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Any other handler failure.
    #[error("Command failed: {0}")]
    Failure(String),
}

impl CommandError {
    /// Returns true if re-running the command against fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::ConcurrencyConflict { .. })
    }

    /// Short label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            CommandError::ConcurrencyConflict { .. } => "conflict",
            CommandError::Unhandled { .. } => "unhandled",
            CommandError::Rejected(_) => "rejected",
            CommandError::InvalidPayload { .. } => "invalid",
            CommandError::AlreadyCompleted
            | CommandError::EventStore(_)
            | CommandError::Failure(_) => "failed",
        }
    }
}

impl From<EventStoreError> for CommandError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            } => CommandError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            },
            other => CommandError::EventStore(other),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        CommandError::Failure(format!("serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_retryable_conflict() {
        let err = CommandError::from(EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::from("app-42"),
            expected: Version::initial(),
            actual: Version::new(1),
        });
        assert!(err.is_retryable());
        assert_eq!(err.outcome(), "conflict");
    }

    #[test]
    fn other_store_errors_are_not_retryable() {
        let err = CommandError::from(EventStoreError::Unavailable("down".to_string()));
        assert!(matches!(err, CommandError::EventStore(_)));
        assert!(!err.is_retryable());
    }
}

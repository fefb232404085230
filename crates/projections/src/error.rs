//! Consumer error types.

use thiserror::Error;

/// Errors that can occur while running event consumers.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The checkpoint database failed.
    #[error("Checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A consumer failed to process an event.
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// No consumer is registered under this name.
    #[error("Unknown consumer: {0}")]
    UnknownConsumer(String),

    /// Two consumers were registered under the same name.
    #[error("Duplicate consumer: {0}")]
    DuplicateConsumer(String),
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

//! Pub/sub error types.

use thiserror::Error;

/// Errors that can occur when publishing or subscribing.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The transport could not deliver or accept the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pub/sub operations.
pub type Result<T> = std::result::Result<T, PubSubError>;

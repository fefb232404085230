//! Node error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CommandError;
use event_store::EventStoreError;
use projections::ConsumerError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// A command failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A consumer operation failed.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Command(err) => (command_status(err), err.outcome()),
            ApiError::Consumer(ConsumerError::UnknownConsumer(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Consumer(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string(), "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn command_status(err: &CommandError) -> StatusCode {
    match err {
        CommandError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        CommandError::Unhandled { .. } | CommandError::InvalidPayload { .. } => {
            StatusCode::BAD_REQUEST
        }
        CommandError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommandError::EventStore(EventStoreError::InvalidAppend(_)) => StatusCode::BAD_REQUEST,
        CommandError::EventStore(EventStoreError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        CommandError::AlreadyCompleted
        | CommandError::EventStore(_)
        | CommandError::Failure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Errors that stop a node from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Pub/sub error: {0}")]
    PubSub(#[from] pubsub::PubSubError),

    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),
}

#[cfg(test)]
mod tests {
    use event_store::{StreamId, Version};

    use super::*;

    #[test]
    fn conflicts_map_to_409() {
        let err = CommandError::ConcurrencyConflict {
            stream_id: StreamId::from("app-42"),
            expected: Version::initial(),
            actual: Version::new(1),
        };
        assert_eq!(command_status(&err), StatusCode::CONFLICT);
    }

    #[test]
    fn domain_rejections_map_to_422() {
        let err = CommandError::Rejected("schema already exists".to_string());
        assert_eq!(command_status(&err), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unknown_consumer_maps_to_404() {
        let response =
            ApiError::Consumer(ConsumerError::UnknownConsumer("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

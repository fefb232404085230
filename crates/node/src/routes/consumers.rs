//! Consumer inspection and control endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bootstrap::Node;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ConsumerResponse {
    pub name: String,
    pub status: String,
    pub health: String,
    pub position: i64,
    pub last_error: Option<String>,
    pub error_position: Option<i64>,
    pub updated_at: DateTime<Utc>,
    /// Entries held by the consumer's read model, if it has one.
    pub entries: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub consumer: String,
    pub accepted: bool,
}

/// GET /consumers — persisted state and live status of every consumer.
pub async fn list(State(node): State<Arc<Node>>) -> Result<Json<Vec<ConsumerResponse>>, ApiError> {
    let runtime = node.runtime();
    let statuses = runtime.statuses();
    let states = runtime.states().await?;

    let mut consumers = Vec::with_capacity(states.len());
    for state in states {
        let status = statuses
            .iter()
            .find(|(name, _)| *name == state.name)
            .map(|(_, progress)| progress.status.to_string())
            .unwrap_or_else(|| "stopped".to_string());
        let entries = match node.read_model(&state.name) {
            Some(model) => Some(model.entries().await),
            None => None,
        };
        consumers.push(ConsumerResponse {
            status,
            health: state.health.as_str().to_string(),
            position: state.position.as_i64(),
            last_error: state.last_error,
            error_position: state.error_position.map(|p| p.as_i64()),
            updated_at: state.updated_at,
            entries,
            name: state.name,
        });
    }

    Ok(Json(consumers))
}

/// POST /consumers/{name}/retry — resume a failed consumer.
#[tracing::instrument(skip(node))]
pub async fn retry(
    State(node): State<Arc<Node>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ControlResponse>), ApiError> {
    let accepted = node.runtime().retry(&name).await?;
    let status = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    Ok((
        status,
        Json(ControlResponse {
            consumer: name,
            accepted,
        }),
    ))
}

/// POST /consumers/{name}/rebuild — clear the projection and replay.
#[tracing::instrument(skip(node))]
pub async fn rebuild(
    State(node): State<Arc<Node>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ControlResponse>), ApiError> {
    node.runtime().rebuild(&name).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ControlResponse {
            consumer: name,
            accepted: true,
        }),
    ))
}

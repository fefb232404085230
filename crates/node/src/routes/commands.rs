//! Command submission endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use domain::{Command, CommandResult};
use event_store::{StreamId, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bootstrap::Node;
use crate::error::ApiError;

/// Header carrying the caller identity, set by the authenticating gateway.
pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub kind: String,
    pub stream_id: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub command_id: Uuid,
    pub stream_id: String,
    pub version: i64,
    pub commit_id: Option<String>,
    pub first_position: Option<i64>,
    pub last_position: Option<i64>,
    pub events: Vec<String>,
}

impl CommandResponse {
    fn new(command_id: Uuid, result: CommandResult) -> Self {
        Self {
            command_id,
            stream_id: result.stream_id.to_string(),
            version: result.version.as_i64(),
            commit_id: result.commit_id.map(|c| c.to_string()),
            first_position: result.first_position.map(|p| p.as_i64()),
            last_position: result.last_position.map(|p| p.as_i64()),
            events: result.events.into_iter().map(|e| e.event_type).collect(),
        }
    }
}

fn build_command(headers: &HeaderMap, req: CommandRequest) -> Result<Command, ApiError> {
    if req.kind.trim().is_empty() {
        return Err(ApiError::BadRequest("kind is required".to_string()));
    }
    if req.stream_id.trim().is_empty() {
        return Err(ApiError::BadRequest("stream_id is required".to_string()));
    }

    let mut command = Command::new(req.kind, StreamId::new(req.stream_id), req.payload);
    command.metadata = req.metadata;

    if let Some(version) = req.expected_version {
        if version < 0 {
            return Err(ApiError::BadRequest(format!(
                "expected_version must not be negative, got {version}"
            )));
        }
        command = command.with_expected_version(Version::new(version));
    }

    if let Some(actor) = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        command = command.with_actor(actor);
    }

    Ok(command)
}

/// POST /commands — run one command through the pipeline.
#[tracing::instrument(
    skip(node, headers, req),
    fields(kind = %req.kind, stream_id = %req.stream_id)
)]
pub async fn execute(
    State(node): State<Arc<Node>>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = build_command(&headers, req)?;
    let command_id = command.command_id;
    let result = node.pipeline().handle(command).await?;
    Ok(Json(CommandResponse::new(command_id, result)))
}

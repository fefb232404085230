//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use projections::ConsumerStatus;
use serde::Serialize;

use crate::bootstrap::Node;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub node_id: String,
    pub failed_consumers: Vec<String>,
}

/// GET /health — `ok`, or `degraded` while any consumer is failed.
///
/// A failed consumer never blocks commands, so the node stays available.
pub async fn check(State(node): State<Arc<Node>>) -> Json<HealthResponse> {
    let failed_consumers: Vec<String> = node
        .runtime()
        .statuses()
        .into_iter()
        .filter(|(_, progress)| progress.status == ConsumerStatus::Failed)
        .map(|(name, _)| name)
        .collect();

    Json(HealthResponse {
        status: if failed_consumers.is_empty() {
            "ok"
        } else {
            "degraded"
        },
        node_id: node.pubsub().node_id().to_string(),
        failed_consumers,
    })
}

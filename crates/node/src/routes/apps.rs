//! Read-model queries for apps.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::APP_STREAM_CATEGORY;
use event_store::StreamId;
use projections::{Contributor, SchemaEntry};

use crate::bootstrap::Node;

/// GET /apps/{app}/schemas — schemas of one app from the schema index.
pub async fn schemas(
    State(node): State<Arc<Node>>,
    Path(app): Path<String>,
) -> Json<Vec<SchemaEntry>> {
    let stream = StreamId::for_aggregate(APP_STREAM_CATEGORY, app);
    Json(node.schemas().schemas_for(&stream).await)
}

/// GET /apps/{app}/contributors — current contributors of one app.
pub async fn contributors(
    State(node): State<Arc<Node>>,
    Path(app): Path<String>,
) -> Json<Vec<Contributor>> {
    let stream = StreamId::for_aggregate(APP_STREAM_CATEGORY, app);
    Json(node.contributors().contributors_of(&stream).await)
}

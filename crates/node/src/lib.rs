//! One node of the event-sourced command pipeline.
//!
//! Wires the event store, pub/sub fabric, command pipeline and consumer
//! runtime together, and serves a small operational HTTP surface with
//! structured logging (tracing) and Prometheus metrics.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use bootstrap::Node;
pub use config::Config;
pub use error::{ApiError, StartupError};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(node: Arc<Node>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/commands", post(routes::commands::execute))
        .route("/consumers", get(routes::consumers::list))
        .route("/consumers/{name}/retry", post(routes::consumers::retry))
        .route("/consumers/{name}/rebuild", post(routes::consumers::rebuild))
        .route("/apps/{app}/schemas", get(routes::apps::schemas))
        .route("/apps/{app}/contributors", get(routes::apps::contributors))
        .with_state(node)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

//! Application setup and router.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::PipelineContext;
use crate::server::routes::{
    archive_content_handler, content_handler, decide_handler, device_deliveries_handler,
    distribute_handler, health_handler, retry_delivery_handler, review_queue_handler,
    stale_deliveries_handler, stats_handler, stream_handler, update_delivery_handler,
    upload_handler,
};

/// Shared application state
pub type AppState = PipelineContext;

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        // Content
        .route("/api/content", post(upload_handler))
        .route("/api/content/:id", get(content_handler))
        .route("/api/content/:id/archive", post(archive_content_handler))
        // Review
        .route("/api/review/queue", get(review_queue_handler))
        .route("/api/review/:id/decision", post(decide_handler))
        // Distribution
        .route("/api/distributions", post(distribute_handler))
        .route("/api/distributions/stats", get(stats_handler))
        .route("/api/distributions/stale", get(stale_deliveries_handler))
        .route("/api/distributions/:id/status", post(update_delivery_handler))
        .route("/api/distributions/:id/retry", post(retry_delivery_handler))
        .route("/api/devices/:id/deliveries", get(device_deliveries_handler))
        // Live streams
        .route("/api/streams/:topic", get(stream_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::domains::content::models::ContentStatusCounts;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    event_bus: EventBusHealth,
    content: ContentStatusCounts,
}

#[derive(Serialize)]
pub struct EventBusHealth {
    status: String,
    subscribers: usize,
    capacity: usize,
    overflow: String,
}

/// Health check endpoint
///
/// Returns 200 OK while the event bus accepts events, 503 once it is closed.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let closed = state.bus.is_closed();
    let status_code = if closed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: if closed { "unhealthy" } else { "healthy" }.to_string(),
            event_bus: EventBusHealth {
                status: if closed { "closed" } else { "ok" }.to_string(),
                subscribers: state.bus.subscriber_count(),
                capacity: state.bus.capacity(),
                overflow: state.bus.policy().to_string(),
            },
            content: state.content.counts(),
        }),
    )
}

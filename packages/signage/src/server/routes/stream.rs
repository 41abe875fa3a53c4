//! SSE streaming endpoint.
//!
//! GET /api/streams/:topic
//!
//! Topics: `dashboard`, `content:{uuid}`, `device:{uuid}`. Subscribes to the
//! StreamHub and forwards JSON notifications as SSE events named by their
//! `type` field.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Path},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::kernel::stream_hub::DASHBOARD_TOPIC;
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// SSE stream handler.
pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Path(topic): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate_topic(&topic)?;

    let rx = state.stream_hub.subscribe(&topic).await;

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(value) => {
                let event_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("message");
                Event::default()
                    .event(event_name)
                    .json_data(&value)
                    .ok()
                    .map(Ok)
            }
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                Event::default()
                    .event("lagged")
                    .json_data(serde_json::json!({"missed": n}))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

/// Only known topic shapes, so clients cannot create arbitrary topics.
fn validate_topic(topic: &str) -> Result<(), ApiError> {
    if topic == DASHBOARD_TOPIC {
        return Ok(());
    }
    let id = topic
        .strip_prefix("content:")
        .or_else(|| topic.strip_prefix("device:"))
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown topic: {}", topic)))?;
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("Invalid id in topic: {}", topic)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic() {
        let id = uuid::Uuid::new_v4();
        assert!(validate_topic("dashboard").is_ok());
        assert!(validate_topic(&format!("content:{}", id)).is_ok());
        assert!(validate_topic(&format!("device:{}", id)).is_ok());
        assert!(validate_topic("chat:1").is_err());
        assert!(validate_topic("content:not-a-uuid").is_err());
    }
}

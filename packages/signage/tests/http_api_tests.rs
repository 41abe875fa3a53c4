//! HTTP API tests driven through the router without a socket.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use common::*;
use serde_json::{json, Value};
use signage_core::common::OwnerId;
use signage_core::domains::content::models::ContentStatus;
use signage_core::server::build_app;
use test_context::test_context;
use tower::ServiceExt;

fn app(ctx: &TestHarness) -> Router {
    build_app(ctx.ctx().clone())
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn upload_body(locator: &str, media_type: &str) -> Value {
    json!({
        "owner_id": OwnerId::new(),
        "media_type": media_type,
        "size_bytes": 2048,
        "storage_locator": locator,
        "title": "Lobby loop",
        "tags": ["Lobby"],
    })
}

#[test_context(TestHarness)]
#[tokio::test]
async fn upload_returns_the_new_item(ctx: &TestHarness) {
    let (status, body) = send(
        app(ctx),
        Method::POST,
        "/api/content",
        Some(upload_body(REVIEW_LOCATOR, "video/mp4")),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["tags"], json!(["lobby"]));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn malformed_media_type_is_a_bad_request(ctx: &TestHarness) {
    let (status, body) = send(
        app(ctx),
        Method::POST,
        "/api/content",
        Some(upload_body(APPROVE_LOCATOR, "png")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("media type"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_content_is_not_found(ctx: &TestHarness) {
    let uri = format!("/api/content/{}", signage_core::common::ContentId::new());
    let (status, _) = send(app(ctx), Method::GET, &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn delivery_lifecycle_over_http(ctx: &TestHarness) {
    let id = approved_content(ctx).await;

    let (status, outcome) = send(
        app(ctx),
        Method::POST,
        "/api/distributions",
        Some(json!({ "content_ids": [id], "device_ids": [ctx.d1], "priority": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let delivery = outcome["created"][0]["delivery_id"].as_str().unwrap().to_string();

    let status_uri = format!("/api/distributions/{}/status", delivery);
    let (status, record) = send(
        app(ctx),
        Method::POST,
        &status_uri,
        Some(json!({ "status": "displayed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "displayed");

    let (status, body) = send(
        app(ctx),
        Method::POST,
        &status_uri,
        Some(json!({ "status": "downloading" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["entity"], "delivery");
    assert_eq!(body["current"], "displayed");
    assert_eq!(body["requested"], "downloading");

    let (status, detail) = send(app(ctx), Method::GET, &format!("/api/content/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "approved");
    assert_eq!(detail["deliveries"][0]["status"], "displayed");

    let (status, stats) = send(app(ctx), Method::GET, "/api/distributions/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_distributions"], 1);
    assert_eq!(stats["displayed"], 1);
    assert_eq!(stats["success_rate"], 1.0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn distributing_pending_content_is_a_failed_precondition(ctx: &TestHarness) {
    let id = pending_content(ctx).await;

    let (status, body) = send(
        app(ctx),
        Method::POST,
        "/api/distributions",
        Some(json!({ "content_ids": [id], "device_ids": [ctx.d1] })),
    )
    .await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["violations"][0]["reason"], "content_not_approved");
    assert_eq!(body["violations"][0]["status"], "pending_review");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn reviewer_decision_over_http(ctx: &TestHarness) {
    let id = pending_content(ctx).await;

    let (status, queue) = send(app(ctx), Method::GET, "/api/review/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue.as_array().unwrap().len(), 1);

    let uri = format!("/api/review/{}/decision", id);
    let decision = json!({
        "verdict": "approve",
        "reviewer_id": signage_core::common::ReviewerId::new(),
        "notes": "fine for lobby screens",
    });
    let (status, item) = send(app(ctx), Method::POST, &uri, Some(decision.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["status"], "approved");
    assert_eq!(ctx.ctx().content.status(id), Some(ContentStatus::Approved));

    let (status, body) = send(app(ctx), Method::POST, &uri, Some(decision)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["current"], "approved");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn device_pulls_its_queue_by_priority(ctx: &TestHarness) {
    let low = approved_content(ctx).await;
    let high = approved_content(ctx).await;
    for (id, priority) in [(low, 1), (high, 9)] {
        ctx.ctx()
            .distribution
            .distribute(request(vec![id], vec![ctx.d1], priority))
            .await
            .unwrap();
    }

    let uri = format!("/api/devices/{}/deliveries?limit=1", ctx.d1);
    let (status, body) = send(app(ctx), Method::GET, &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    let deliveries = body.as_array().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0]["content_id"], high.to_string());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn health_reports_the_bus(ctx: &TestHarness) {
    let (status, body) = send(app(ctx), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_bus"]["overflow"], "reject");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn unknown_stream_topic_is_a_bad_request(ctx: &TestHarness) {
    let (status, body) = send(app(ctx), Method::GET, "/api/streams/weather", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("weather"));
}

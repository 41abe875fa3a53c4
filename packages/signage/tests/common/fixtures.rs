//! Test fixtures for creating test data.

use signage_core::common::{ContentId, OwnerId};
use signage_core::domains::content::models::{ContentStatus, NewContent};
use signage_core::domains::distribution::DistributionRequest;

use super::harness::TestHarness;

/// Scored 0.98: approved automatically.
pub const APPROVE_LOCATOR: &str = "s3://fixtures/approve.png";
/// Scored 0.5: escalated to human review.
pub const REVIEW_LOCATOR: &str = "s3://fixtures/review.mp4";
/// Scored 0.1: rejected automatically.
pub const REJECT_LOCATOR: &str = "s3://fixtures/reject.jpg";
/// Every scorer call fails.
pub const UNAVAILABLE_LOCATOR: &str = "s3://fixtures/unavailable.png";
/// Every scorer call hangs until the timeout.
pub const HANG_LOCATOR: &str = "s3://fixtures/hang.png";
/// Every scorer call panics.
pub const PANIC_LOCATOR: &str = "s3://fixtures/panic.png";

pub fn new_content(locator: &str) -> NewContent {
    NewContent::builder()
        .owner_id(OwnerId::new())
        .media_type("image/png")
        .size_bytes(1024)
        .storage_locator(locator)
        .title("Spring campaign")
        .tags(vec!["Retail".to_string()])
        .build()
}

/// Ingest an upload; moderation starts in the background.
pub fn upload(ctx: &TestHarness, locator: &str) -> ContentId {
    ctx.ctx()
        .content
        .ingest(new_content(locator))
        .expect("Failed to ingest content")
        .id
}

pub async fn approved_content(ctx: &TestHarness) -> ContentId {
    let id = upload(ctx, APPROVE_LOCATOR);
    ctx.wait_for_status(id, ContentStatus::Approved).await;
    id
}

pub async fn pending_content(ctx: &TestHarness) -> ContentId {
    let id = upload(ctx, REVIEW_LOCATOR);
    ctx.wait_for_status(id, ContentStatus::PendingReview).await;
    id
}

pub fn request(
    content_ids: Vec<ContentId>,
    device_ids: Vec<signage_core::common::DeviceId>,
    priority: i32,
) -> DistributionRequest {
    DistributionRequest::builder()
        .content_ids(content_ids)
        .device_ids(device_ids)
        .priority(priority)
        .build()
}

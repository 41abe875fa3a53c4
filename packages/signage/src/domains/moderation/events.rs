use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::ModerationAction;
use crate::common::{ContentId, ReviewerId};
use crate::domains::content::models::{ContentItem, ContentStatus};
use crate::events::{publish_logged, PipelineBus};

/// Who settled an item's moderation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DecisionSource {
    Automatic { action: ModerationAction },
    Reviewer { reviewer_id: ReviewerId },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModerationEvent {
    /// Moderation settled the item (finally, or by escalating it).
    Completed {
        content_id: ContentId,
        status: ContentStatus,
        confidence: Option<f64>,
        decided_by: DecisionSource,
        completed_at: DateTime<Utc>,
    },

    /// Item became approved. Emitted once per item.
    ContentApproved {
        content_id: ContentId,
        decided_by: DecisionSource,
        approved_at: DateTime<Utc>,
    },
}

impl ModerationEvent {
    pub fn content_id(&self) -> ContentId {
        match self {
            ModerationEvent::Completed { content_id, .. }
            | ModerationEvent::ContentApproved { content_id, .. } => *content_id,
        }
    }
}

/// Publish the outcome of a settled decision on `item`:
/// `moderation_completed`, then `content_approved` if it was approved.
///
/// Called from inside the transition that settled it, so both land before
/// any later status change on the item.
pub(crate) fn announce_decision(
    bus: &PipelineBus,
    item: &ContentItem,
    confidence: Option<f64>,
    decided_by: DecisionSource,
) {
    let at = item.updated_at;
    publish_logged(
        bus,
        ModerationEvent::Completed {
            content_id: item.id,
            status: item.status,
            confidence,
            decided_by,
            completed_at: at,
        },
    );
    if item.status == ContentStatus::Approved {
        publish_logged(
            bus,
            ModerationEvent::ContentApproved {
                content_id: item.id,
                decided_by,
                approved_at: at,
            },
        );
    }
}

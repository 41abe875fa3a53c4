use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{ContentStatus, TransitionCause};
use crate::common::{ContentId, OwnerId};

/// Facts about content items.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    /// Upload accepted. Re-published by the reaper if moderation never picked it up.
    Uploaded {
        content_id: ContentId,
        owner_id: OwnerId,
        media_type: String,
        size_bytes: u64,
        storage_locator: String,
        uploaded_at: DateTime<Utc>,
    },

    StatusChanged {
        content_id: ContentId,
        from: ContentStatus,
        to: ContentStatus,
        cause: TransitionCause,
        changed_at: DateTime<Utc>,
    },
}

impl ContentEvent {
    pub fn content_id(&self) -> ContentId {
        match self {
            ContentEvent::Uploaded { content_id, .. }
            | ContentEvent::StatusChanged { content_id, .. } => *content_id,
        }
    }
}

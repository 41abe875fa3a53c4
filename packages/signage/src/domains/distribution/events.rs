use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::DeliveryStatus;
use crate::common::{ContentId, DeliveryId, DeviceId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DistributionEvent {
    Queued {
        delivery_id: DeliveryId,
        content_id: ContentId,
        device_id: DeviceId,
        priority: i32,
        supersedes: Option<DeliveryId>,
        queued_at: DateTime<Utc>,
    },

    /// Device-reported progress (or supersession) on one record.
    StatusUpdated {
        delivery_id: DeliveryId,
        content_id: ContentId,
        device_id: DeviceId,
        from: DeliveryStatus,
        to: DeliveryStatus,
        detail: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

impl DistributionEvent {
    pub fn content_id(&self) -> ContentId {
        match self {
            DistributionEvent::Queued { content_id, .. }
            | DistributionEvent::StatusUpdated { content_id, .. } => *content_id,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        match self {
            DistributionEvent::Queued { device_id, .. }
            | DistributionEvent::StatusUpdated { device_id, .. } => *device_id,
        }
    }

    pub fn delivery_id(&self) -> DeliveryId {
        match self {
            DistributionEvent::Queued { delivery_id, .. }
            | DistributionEvent::StatusUpdated { delivery_id, .. } => *delivery_id,
        }
    }
}

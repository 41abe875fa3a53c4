use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::common::{ContentId, DeliveryId, DeviceId};
use crate::events::PipelineEvent;
use crate::kernel::event_bus::{Event, EventEnvelope};

/// JSON-ready rendering of one bus event for observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub content_id: ContentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<DeliveryId>,
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    pub payload: Value,
}

impl Notification {
    pub fn from_envelope(envelope: &EventEnvelope<PipelineEvent>) -> Self {
        let (device_id, delivery_id) = match &envelope.event {
            PipelineEvent::Distribution(e) => (Some(e.device_id()), Some(e.delivery_id())),
            _ => (None, None),
        };

        Self {
            kind: envelope.event.name().to_string(),
            content_id: envelope.event.content_id(),
            device_id,
            delivery_id,
            sequence: envelope.sequence,
            published_at: envelope.published_at,
            payload: serde_json::to_value(&envelope.event).unwrap_or(Value::Null),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

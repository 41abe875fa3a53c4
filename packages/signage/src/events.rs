//! The single event type carried on the pipeline bus.
//!
//! Each domain owns its own event enum; `PipelineEvent` wraps them so one
//! bus (and one FIFO per subscriber) carries everything. Every variant is
//! keyed by its content id, which is what gives per-content ordering.

use serde::Serialize;
use uuid::Uuid;

use crate::common::ContentId;
use crate::domains::content::events::ContentEvent;
use crate::domains::distribution::events::DistributionEvent;
use crate::domains::moderation::events::ModerationEvent;
use crate::kernel::event_bus::Event;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    Content(ContentEvent),
    Moderation(ModerationEvent),
    Distribution(DistributionEvent),
}

impl PipelineEvent {
    pub fn content_id(&self) -> ContentId {
        match self {
            PipelineEvent::Content(e) => e.content_id(),
            PipelineEvent::Moderation(e) => e.content_id(),
            PipelineEvent::Distribution(e) => e.content_id(),
        }
    }
}

impl Event for PipelineEvent {
    fn ordering_key(&self) -> Uuid {
        self.content_id().into_uuid()
    }

    /// Notification type name.
    fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Content(ContentEvent::Uploaded { .. }) => "content_uploaded",
            PipelineEvent::Content(ContentEvent::StatusChanged { .. }) => "content_status_changed",
            PipelineEvent::Moderation(ModerationEvent::Completed { .. }) => "moderation_completed",
            PipelineEvent::Moderation(ModerationEvent::ContentApproved { .. }) => {
                "content_approved"
            }
            PipelineEvent::Distribution(DistributionEvent::Queued { .. }) => "distribution_queued",
            PipelineEvent::Distribution(DistributionEvent::StatusUpdated { .. }) => {
                "content_status_update"
            }
        }
    }
}

impl From<ContentEvent> for PipelineEvent {
    fn from(event: ContentEvent) -> Self {
        PipelineEvent::Content(event)
    }
}

impl From<ModerationEvent> for PipelineEvent {
    fn from(event: ModerationEvent) -> Self {
        PipelineEvent::Moderation(event)
    }
}

impl From<DistributionEvent> for PipelineEvent {
    fn from(event: DistributionEvent) -> Self {
        PipelineEvent::Distribution(event)
    }
}

/// Bus carrying pipeline events.
pub type PipelineBus = crate::kernel::event_bus::EventBus<PipelineEvent>;

/// Publish and log instead of failing: the state change that produced the
/// event has already happened and stays authoritative.
pub(crate) fn publish_logged(bus: &PipelineBus, event: impl Into<PipelineEvent>) {
    let event = event.into();
    let name = event.name();
    let content_id = event.content_id();
    if let Err(e) = bus.publish(event) {
        tracing::warn!(%content_id, event = name, error = %e, "event publish incomplete");
    }
}

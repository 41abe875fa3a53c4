use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::common::{ContentId, DeliveryId, DeviceId};
use crate::domains::content::models::ContentStatus;
use crate::domains::distribution::models::DeliveryStatus;

/// Errors returned synchronously by pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid {} transition for {id}: {current} -> {requested}", .current.entity())]
    InvalidTransition {
        id: Uuid,
        current: StatusRef,
        requested: StatusRef,
    },

    #[error("Precondition failed: {}", describe(.violations))]
    PreconditionFailed { violations: Vec<PreconditionViolation> },

    #[error("Scorer unavailable for {content_id} after {attempts} attempt(s): {last_error}")]
    ScorerUnavailable {
        content_id: ContentId,
        attempts: u32,
        last_error: String,
    },

    /// Replayed event for an item already past the status it applies to.
    #[error("Duplicate event for {content_id} (already {status})")]
    DuplicateEvent {
        content_id: ContentId,
        status: ContentStatus,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn content_not_found(id: ContentId) -> Self {
        PipelineError::NotFound {
            entity: "content",
            id: id.into_uuid(),
        }
    }

    pub fn delivery_not_found(id: DeliveryId) -> Self {
        PipelineError::NotFound {
            entity: "delivery",
            id: id.into_uuid(),
        }
    }

    pub fn precondition(violation: PreconditionViolation) -> Self {
        PipelineError::PreconditionFailed {
            violations: vec![violation],
        }
    }
}

/// Status of either entity, for transition errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusRef {
    Content(ContentStatus),
    Delivery(DeliveryStatus),
}

impl StatusRef {
    pub fn entity(&self) -> &'static str {
        match self {
            StatusRef::Content(_) => "content",
            StatusRef::Delivery(_) => "delivery",
        }
    }
}

impl std::fmt::Display for StatusRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusRef::Content(s) => write!(f, "{}", s),
            StatusRef::Delivery(s) => write!(f, "{}", s),
        }
    }
}

impl From<ContentStatus> for StatusRef {
    fn from(status: ContentStatus) -> Self {
        StatusRef::Content(status)
    }
}

impl From<DeliveryStatus> for StatusRef {
    fn from(status: DeliveryStatus) -> Self {
        StatusRef::Delivery(status)
    }
}

/// One reason a distribution request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PreconditionViolation {
    EmptyRequest,
    UnknownContent {
        content_id: ContentId,
    },
    ContentNotApproved {
        content_id: ContentId,
        status: ContentStatus,
    },
    DeviceIneligible {
        device_id: DeviceId,
    },
    RegistryUnavailable {
        device_id: DeviceId,
        error: String,
    },
    ActiveDeliveryExists {
        content_id: ContentId,
        device_id: DeviceId,
        delivery_id: DeliveryId,
    },
    DeliveryNotFailed {
        delivery_id: DeliveryId,
        status: DeliveryStatus,
    },
    AlreadyRetried {
        delivery_id: DeliveryId,
        replacement: DeliveryId,
    },
}

impl std::fmt::Display for PreconditionViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreconditionViolation::EmptyRequest => {
                write!(f, "request names no content or no devices")
            }
            PreconditionViolation::UnknownContent { content_id } => {
                write!(f, "content {} does not exist", content_id)
            }
            PreconditionViolation::ContentNotApproved { content_id, status } => {
                write!(f, "content {} is {}, not approved", content_id, status)
            }
            PreconditionViolation::DeviceIneligible { device_id } => {
                write!(f, "device {} is not eligible", device_id)
            }
            PreconditionViolation::RegistryUnavailable { device_id, error } => {
                write!(f, "could not check device {}: {}", device_id, error)
            }
            PreconditionViolation::ActiveDeliveryExists {
                content_id,
                device_id,
                delivery_id,
            } => write!(
                f,
                "content {} already has active delivery {} on device {}",
                content_id, delivery_id, device_id
            ),
            PreconditionViolation::DeliveryNotFailed {
                delivery_id,
                status,
            } => write!(f, "delivery {} is {}, not failed", delivery_id, status),
            PreconditionViolation::AlreadyRetried {
                delivery_id,
                replacement,
            } => write!(
                f,
                "delivery {} was already replaced by {}",
                delivery_id, replacement
            ),
        }
    }
}

fn describe(violations: &[PreconditionViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

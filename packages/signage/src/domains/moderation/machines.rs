//! Auto-decision policy.
//!
//! A pure function of (confidence, thresholds). No I/O, no clock.

use serde::{Deserialize, Serialize};

use super::models::ModerationAction;
use crate::domains::content::models::ContentStatus;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Confidence at or above which content is approved without review.
    pub auto_approve: f64,
    /// Confidence at or below which content is rejected without review.
    pub auto_reject: f64,
}

impl Thresholds {
    pub fn new(auto_approve: f64, auto_reject: f64) -> Result<Self, PipelineError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&auto_approve) || !unit.contains(&auto_reject) {
            return Err(PipelineError::Validation(format!(
                "thresholds must be within [0, 1] (approve {}, reject {})",
                auto_approve, auto_reject
            )));
        }
        if auto_reject >= auto_approve {
            return Err(PipelineError::Validation(format!(
                "auto-reject threshold {} must be below auto-approve threshold {}",
                auto_reject, auto_approve
            )));
        }
        Ok(Self {
            auto_approve,
            auto_reject,
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.9,
            auto_reject: 0.3,
        }
    }
}

/// Result of applying the thresholds to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDecision {
    Approve,
    Reject,
    Escalate,
}

impl AutoDecision {
    pub fn target_status(self) -> ContentStatus {
        match self {
            AutoDecision::Approve => ContentStatus::Approved,
            AutoDecision::Reject => ContentStatus::Rejected,
            AutoDecision::Escalate => ContentStatus::PendingReview,
        }
    }

    pub fn action(self) -> ModerationAction {
        match self {
            AutoDecision::Approve => ModerationAction::AutoApproved,
            AutoDecision::Reject => ModerationAction::AutoRejected,
            AutoDecision::Escalate => ModerationAction::Escalated,
        }
    }
}

/// Boundaries are inclusive. A confidence outside [0, 1] (or NaN) cannot be
/// trusted either way and goes to a human.
pub fn decide(confidence: f64, thresholds: &Thresholds) -> AutoDecision {
    if !(0.0..=1.0).contains(&confidence) {
        return AutoDecision::Escalate;
    }
    if confidence >= thresholds.auto_approve {
        AutoDecision::Approve
    } else if confidence <= thresholds.auto_reject {
        AutoDecision::Reject
    } else {
        AutoDecision::Escalate
    }
}

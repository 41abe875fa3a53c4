use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::ReviewerId;
use crate::kernel::ModerationAnalysis;

/// What automated moderation did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    AutoApproved,
    AutoRejected,
    /// Score fell between the thresholds (or was unusable).
    Escalated,
    /// Scorer never answered within the retry budget.
    ScoringUnavailable,
}

impl std::fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModerationAction::AutoApproved => write!(f, "auto_approved"),
            ModerationAction::AutoRejected => write!(f, "auto_rejected"),
            ModerationAction::Escalated => write!(f, "escalated"),
            ModerationAction::ScoringUnavailable => write!(f, "scoring_unavailable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    Reject,
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewVerdict::Approve => write!(f, "approve"),
            ReviewVerdict::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for ReviewVerdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "approve" => Ok(ReviewVerdict::Approve),
            "reject" => Ok(ReviewVerdict::Reject),
            _ => Err(anyhow::anyhow!("Invalid review verdict: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanReview {
    pub reviewer_id: ReviewerId,
    pub verdict: ReviewVerdict,
    pub notes: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Outcome of moderation, attached to the content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Scorer confidence; `None` when scoring was unavailable.
    pub confidence: Option<f64>,
    pub action: ModerationAction,
    pub analysis: ModerationAnalysis,
    /// Scorer calls made, including the successful one.
    pub attempts: u32,
    pub scored_at: DateTime<Utc>,
    pub human: Option<HumanReview>,
}

impl ReviewRecord {
    pub fn scored(
        confidence: f64,
        action: ModerationAction,
        analysis: ModerationAnalysis,
        attempts: u32,
    ) -> Self {
        Self {
            confidence: Some(confidence),
            action,
            analysis,
            attempts,
            scored_at: Utc::now(),
            human: None,
        }
    }

    /// Placeholder review for items the scorer never got to.
    pub fn scoring_unavailable(attempts: u32, last_error: &str) -> Self {
        Self {
            confidence: None,
            action: ModerationAction::ScoringUnavailable,
            analysis: ModerationAnalysis {
                reasoning: format!(
                    "Scoring unavailable after {} attempt(s): {}",
                    attempts, last_error
                ),
                concerns: vec!["automated scoring unavailable".to_string()],
                suggestions: vec!["review manually".to_string()],
                ..Default::default()
            },
            attempts,
            scored_at: Utc::now(),
            human: None,
        }
    }

    pub fn is_scoring_unavailable(&self) -> bool {
        self.action == ModerationAction::ScoringUnavailable
    }
}

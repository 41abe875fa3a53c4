use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::common::{ContentId, OwnerId, ReviewerId};
use crate::domains::moderation::models::ReviewRecord;

/// One uploaded asset and everything the pipeline knows about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub owner_id: OwnerId,

    // Upload metadata (immutable)
    pub media_type: String,
    pub size_bytes: u64,
    pub storage_locator: String,

    // Descriptive
    pub title: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,

    pub status: ContentStatus,
    pub review: Option<ReviewRecord>,
    /// Append-only audit trail, oldest first.
    pub history: Vec<StatusChange>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Time the item entered its current status.
    pub fn status_since(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|change| change.at)
            .unwrap_or(self.created_at)
    }
}

/// Upload metadata handed over by the storage collaborator.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewContent {
    /// Assigned by the uploader when known; generated otherwise.
    #[builder(default = ContentId::new())]
    pub id: ContentId,
    pub owner_id: OwnerId,
    #[builder(setter(into))]
    pub media_type: String,
    pub size_bytes: u64,
    #[builder(setter(into))]
    pub storage_locator: String,
    #[builder(setter(into))]
    pub title: String,
    #[builder(default, setter(strip_option, into))]
    pub description: Option<String>,
    #[builder(default)]
    pub tags: Vec<String>,
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Uploaded,
    Quarantined,
    PendingReview,
    Approved,
    Rejected,
    Archived,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 6] = [
        ContentStatus::Uploaded,
        ContentStatus::Quarantined,
        ContentStatus::PendingReview,
        ContentStatus::Approved,
        ContentStatus::Rejected,
        ContentStatus::Archived,
    ];

    /// Dense index for counter arrays.
    pub fn index(self) -> usize {
        match self {
            ContentStatus::Uploaded => 0,
            ContentStatus::Quarantined => 1,
            ContentStatus::PendingReview => 2,
            ContentStatus::Approved => 3,
            ContentStatus::Rejected => 4,
            ContentStatus::Archived => 5,
        }
    }

    /// Statuses reachable in one step.
    pub fn successors(self) -> &'static [ContentStatus] {
        use ContentStatus::*;
        match self {
            Uploaded => &[Quarantined],
            Quarantined => &[PendingReview, Approved, Rejected],
            PendingReview => &[Approved, Rejected],
            Approved | Rejected => &[Archived],
            Archived => &[],
        }
    }

    pub fn can_transition_to(self, target: ContentStatus) -> bool {
        self.successors().contains(&target)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentStatus::Uploaded => write!(f, "uploaded"),
            ContentStatus::Quarantined => write!(f, "quarantined"),
            ContentStatus::PendingReview => write!(f, "pending_review"),
            ContentStatus::Approved => write!(f, "approved"),
            ContentStatus::Rejected => write!(f, "rejected"),
            ContentStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "uploaded" => Ok(ContentStatus::Uploaded),
            "quarantined" => Ok(ContentStatus::Quarantined),
            "pending_review" => Ok(ContentStatus::PendingReview),
            "approved" => Ok(ContentStatus::Approved),
            "rejected" => Ok(ContentStatus::Rejected),
            "archived" => Ok(ContentStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid content status: {}", s)),
        }
    }
}

// =============================================================================
// Transition causes and history
// =============================================================================

/// Why a status changed. Part of the transition request and the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionCause {
    /// Upload accepted, or picked up for moderation.
    Ingestion,
    /// Scorer result applied against the thresholds.
    AutoModeration { confidence: f64 },
    /// Scoring gave up after exhausting retries.
    ScoringUnavailable { attempts: u32 },
    HumanDecision { reviewer_id: ReviewerId },
    Archival { actor: Option<String> },
}

impl TransitionCause {
    pub fn kind(&self) -> &'static str {
        match self {
            TransitionCause::Ingestion => "ingestion",
            TransitionCause::AutoModeration { .. } => "auto_moderation",
            TransitionCause::ScoringUnavailable { .. } => "scoring_unavailable",
            TransitionCause::HumanDecision { .. } => "human_decision",
            TransitionCause::Archival { .. } => "archival",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for the creation entry.
    pub from: Option<ContentStatus>,
    pub to: ContentStatus,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Counts
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStatusCounts {
    pub uploaded: u64,
    pub quarantined: u64,
    pub pending_review: u64,
    pub approved: u64,
    pub rejected: u64,
    pub archived: u64,
}

impl ContentStatusCounts {
    pub fn get(&self, status: ContentStatus) -> u64 {
        match status {
            ContentStatus::Uploaded => self.uploaded,
            ContentStatus::Quarantined => self.quarantined,
            ContentStatus::PendingReview => self.pending_review,
            ContentStatus::Approved => self.approved,
            ContentStatus::Rejected => self.rejected,
            ContentStatus::Archived => self.archived,
        }
    }

    pub fn slot(&mut self, status: ContentStatus) -> &mut u64 {
        match status {
            ContentStatus::Uploaded => &mut self.uploaded,
            ContentStatus::Quarantined => &mut self.quarantined,
            ContentStatus::PendingReview => &mut self.pending_review,
            ContentStatus::Approved => &mut self.approved,
            ContentStatus::Rejected => &mut self.rejected,
            ContentStatus::Archived => &mut self.archived,
        }
    }

    pub fn total(&self) -> u64 {
        ContentStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

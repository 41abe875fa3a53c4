use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::common::{ContentId, ReviewerId};
use crate::domains::content::models::{ContentItem, ContentStatus, TransitionCause};
use crate::domains::content::store::ContentStore;
use crate::domains::moderation::events::{announce_decision, DecisionSource};
use crate::domains::moderation::models::{
    HumanReview, ModerationAction, ReviewRecord, ReviewVerdict,
};
use crate::error::PipelineError;
use crate::events::PipelineBus;
use crate::kernel::ModerationAnalysis;

/// Human review surface: what is waiting, and reviewer decisions.
#[derive(Clone)]
pub struct ReviewDesk {
    store: Arc<ContentStore>,
    bus: PipelineBus,
}

impl ReviewDesk {
    pub fn new(store: Arc<ContentStore>, bus: PipelineBus) -> Self {
        Self { store, bus }
    }

    /// Items awaiting a reviewer, oldest first.
    pub fn queue(&self) -> Vec<ContentItem> {
        self.store.list_by_status(ContentStatus::PendingReview)
    }

    /// Approve or reject an item in `pending_review`.
    ///
    /// Anything else (already decided, still being scored) fails with
    /// `InvalidTransition` naming the item's actual status.
    pub fn decide(
        &self,
        content_id: ContentId,
        verdict: ReviewVerdict,
        reviewer_id: ReviewerId,
        notes: Option<String>,
    ) -> Result<ContentItem, PipelineError> {
        let target = match verdict {
            ReviewVerdict::Approve => ContentStatus::Approved,
            ReviewVerdict::Reject => ContentStatus::Rejected,
        };
        let decided_at = Utc::now();
        let human = HumanReview {
            reviewer_id,
            verdict,
            notes: notes.filter(|n| !n.trim().is_empty()),
            decided_at,
        };

        let decided_by = DecisionSource::Reviewer { reviewer_id };
        let item = self.store.transition_announcing(
            content_id,
            target,
            TransitionCause::HumanDecision { reviewer_id },
            move |review| {
                let record = review.get_or_insert_with(|| ReviewRecord {
                    confidence: None,
                    action: ModerationAction::Escalated,
                    analysis: ModerationAnalysis::default(),
                    attempts: 0,
                    scored_at: decided_at,
                    human: None,
                });
                record.human = Some(human);
            },
            |item| {
                let confidence = item.review.as_ref().and_then(|r| r.confidence);
                announce_decision(&self.bus, item, confidence, decided_by);
            },
        )?;

        info!(%content_id, %reviewer_id, %verdict, "review decision recorded");

        Ok(item)
    }
}

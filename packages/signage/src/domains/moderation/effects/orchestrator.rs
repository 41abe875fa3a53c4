//! Moderation orchestrator.
//!
//! Watches `content_uploaded`. For each item it:
//!
//! 1. claims the item with `uploaded → quarantined`. Losing the claim means
//!    the event is a replay and is dropped.
//! 2. scores it (timeout, backoff, bounded retries)
//! 3. applies the thresholds
//! 4. makes one transition carrying the review record
//! 5. emits `moderation_completed`, plus `content_approved` when approved
//!
//! When the scorer never answers, step 4 moves the item to
//! `pending_review` with a "scoring unavailable" review so a human can
//! unblock it. Nothing is left in `quarantined`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::scoring::{score_with_retries, ScoringRetryPolicy};
use crate::common::ContentId;
use crate::domains::content::events::ContentEvent;
use crate::domains::content::models::{ContentItem, ContentStatus, TransitionCause};
use crate::domains::content::store::ContentStore;
use crate::domains::moderation::events::{announce_decision, DecisionSource};
use crate::domains::moderation::machines::{decide, Thresholds};
use crate::domains::moderation::models::ReviewRecord;
use crate::error::PipelineError;
use crate::events::{PipelineBus, PipelineEvent};
use crate::kernel::event_bus::EventEnvelope;
use crate::kernel::worker::EventHandler;
use crate::kernel::{BaseContentScorer, ScoreRequest};

pub struct ModerationOrchestrator {
    store: Arc<ContentStore>,
    scorer: Arc<dyn BaseContentScorer>,
    bus: PipelineBus,
    thresholds: Thresholds,
    retry: ScoringRetryPolicy,
    shutdown: CancellationToken,
}

impl ModerationOrchestrator {
    pub fn new(
        store: Arc<ContentStore>,
        scorer: Arc<dyn BaseContentScorer>,
        bus: PipelineBus,
        thresholds: Thresholds,
        retry: ScoringRetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            scorer,
            bus,
            thresholds,
            retry,
            shutdown,
        }
    }

    /// Run moderation for one uploaded item. Replays are a logged no-op.
    pub async fn moderate(&self, content_id: ContentId) -> Result<(), PipelineError> {
        let item = match self.store.transition(
            content_id,
            ContentStatus::Quarantined,
            TransitionCause::Ingestion,
        ) {
            Ok(item) => item,
            Err(PipelineError::InvalidTransition { .. }) => {
                let status = self
                    .store
                    .status(content_id)
                    .unwrap_or(ContentStatus::Quarantined);
                let duplicate = PipelineError::DuplicateEvent { content_id, status };
                debug!(%content_id, error = %duplicate, "dropping duplicate upload event");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let request = ScoreRequest {
            content_id,
            media_type: item.media_type.clone(),
            storage_locator: item.storage_locator.clone(),
        };

        let outcome = match score_with_retries(
            self.scorer.as_ref(),
            &request,
            &self.retry,
            &self.shutdown,
        )
        .await
        {
            Ok(scored) => {
                let confidence = scored.score.confidence;
                let decision = decide(confidence, &self.thresholds);
                let action = decision.action();
                let review =
                    ReviewRecord::scored(confidence, action, scored.score.analysis, scored.attempts);

                info!(
                    %content_id,
                    confidence,
                    %action,
                    attempts = scored.attempts,
                    "moderation completed"
                );
                self.settle(
                    content_id,
                    decision.target_status(),
                    TransitionCause::AutoModeration { confidence },
                    review,
                    Some(confidence),
                )
            }
            Err(exhausted) => {
                let unavailable = PipelineError::ScorerUnavailable {
                    content_id,
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.clone(),
                };
                error!(%content_id, error = %unavailable, "scoring budget exhausted, escalating to human review");

                self.settle(
                    content_id,
                    ContentStatus::PendingReview,
                    TransitionCause::ScoringUnavailable {
                        attempts: exhausted.attempts,
                    },
                    ReviewRecord::scoring_unavailable(exhausted.attempts, &exhausted.last_error),
                    None,
                )
            }
        };

        match outcome {
            // The quarantine sweep escalated the item while we were scoring.
            Err(PipelineError::InvalidTransition { current, .. }) => {
                warn!(%content_id, %current, "item left quarantine before scoring finished");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    /// Apply the decision and announce it under the item's lock.
    fn settle(
        &self,
        content_id: ContentId,
        target: ContentStatus,
        cause: TransitionCause,
        review: ReviewRecord,
        confidence: Option<f64>,
    ) -> Result<ContentItem, PipelineError> {
        let decided_by = DecisionSource::Automatic {
            action: review.action,
        };
        self.store.transition_announcing(
            content_id,
            target,
            cause,
            move |slot| *slot = Some(review),
            |item| announce_decision(&self.bus, item, confidence, decided_by),
        )
    }
}

#[async_trait]
impl EventHandler<PipelineEvent> for ModerationOrchestrator {
    fn name(&self) -> &'static str {
        "moderation"
    }

    async fn handle(&self, envelope: &EventEnvelope<PipelineEvent>) -> Result<()> {
        let PipelineEvent::Content(ContentEvent::Uploaded { content_id, .. }) = &envelope.event
        else {
            return Ok(());
        };

        match self.moderate(*content_id).await {
            Ok(()) => Ok(()),
            Err(PipelineError::NotFound { .. }) => {
                warn!(%content_id, "upload event for unknown content");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! Upload reaper.
//!
//! Items still `uploaded` after the grace period never reached moderation
//! (the event was rejected or evicted on overflow, or a worker died). The
//! reaper re-announces them; the orchestrator's claim makes the replay safe.
//!
//! Items still `quarantined` once the whole scoring budget (plus grace) has
//! passed lost their orchestrator mid-flight. They are escalated to
//! `pending_review` with a scoring-unavailable review.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::{ContentStatus, TransitionCause};
use super::store::ContentStore;
use crate::domains::moderation::events::{announce_decision, DecisionSource};
use crate::domains::moderation::models::{ModerationAction, ReviewRecord};
use crate::error::PipelineError;
use crate::events::PipelineBus;
use crate::kernel::worker::Service;

pub struct UploadReaper {
    store: Arc<ContentStore>,
    bus: PipelineBus,
    interval: Duration,
    grace: Duration,
    scoring_budget: Option<Duration>,
}

fn cutoff(age: Duration) -> chrono::DateTime<Utc> {
    let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::days(365 * 100));
    Utc::now()
        .checked_sub_signed(age)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
}

impl UploadReaper {
    pub fn new(store: Arc<ContentStore>, bus: PipelineBus, interval: Duration, grace: Duration) -> Self {
        Self {
            store,
            bus,
            interval,
            grace,
            scoring_budget: None,
        }
    }

    /// Also escalate items quarantined for longer than `budget` plus grace.
    pub fn with_quarantine_backstop(mut self, budget: Duration) -> Self {
        self.scoring_budget = Some(budget);
        self
    }

    /// One pass. Returns how many uploads were re-announced.
    pub fn sweep(&self) -> usize {
        let mut republished = 0;
        for item in self.store.stuck_in(ContentStatus::Uploaded, cutoff(self.grace)) {
            match self.bus.publish(ContentStore::uploaded_event(&item).into()) {
                Ok(_) => republished += 1,
                Err(e) => warn!(content_id = %item.id, error = %e, "could not re-announce upload"),
            }
        }

        if republished > 0 {
            info!(count = republished, "re-announced stalled uploads");
        } else {
            debug!("no stalled uploads");
        }
        republished
    }

    /// Escalate items stranded in `quarantined`. Returns how many moved.
    pub fn sweep_quarantined(&self) -> usize {
        let Some(budget) = self.scoring_budget else {
            return 0;
        };

        let mut escalated = 0;
        let stranded = self
            .store
            .stuck_in(ContentStatus::Quarantined, cutoff(budget.saturating_add(self.grace)));
        for item in stranded {
            let action = ModerationAction::ScoringUnavailable;
            let review = ReviewRecord::scoring_unavailable(0, "scoring did not finish within its budget");
            let result = self.store.transition_announcing(
                item.id,
                ContentStatus::PendingReview,
                TransitionCause::ScoringUnavailable { attempts: 0 },
                move |slot| *slot = Some(review),
                |item| announce_decision(&self.bus, item, None, DecisionSource::Automatic { action }),
            );
            match result {
                Ok(_) => escalated += 1,
                // Scoring finished between the listing and the transition.
                Err(PipelineError::InvalidTransition { .. }) => {}
                Err(e) => warn!(content_id = %item.id, error = %e, "could not escalate stranded item"),
            }
        }

        if escalated > 0 {
            warn!(count = escalated, "escalated items stranded in quarantine");
        }
        escalated
    }
}

#[async_trait]
impl Service for UploadReaper {
    fn name(&self) -> &'static str {
        "upload-reaper"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            interval = ?self.interval,
            grace = ?self.grace,
            scoring_budget = ?self.scoring_budget,
            "upload reaper starting"
        );
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                    self.sweep_quarantined();
                }
            }
        }

        info!("upload reaper stopped");
        Ok(())
    }
}

//! Opt-in auto-distribution of approved content to the active fleet.
//!
//! `content_approved` drives it. Approvals whose event never reached this
//! subscriber (rejected or evicted on overflow) are picked up by
//! [`ApprovalSweeper`]: anything approved for longer than the grace period
//! with no delivery record at all gets distributed from the sweep instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::ContentId;
use crate::domains::content::models::ContentStatus;
use crate::domains::content::store::ContentStore;
use crate::domains::distribution::engine::{
    ActivePairPolicy, DistributionEngine, DistributionOutcome, DistributionRequest,
};
use crate::domains::moderation::events::ModerationEvent;
use crate::error::{PipelineError, PreconditionViolation};
use crate::events::PipelineEvent;
use crate::kernel::event_bus::EventEnvelope;
use crate::kernel::worker::{EventHandler, Service};
use crate::kernel::BaseDeviceRegistry;

pub struct AutoDistributor {
    engine: Arc<DistributionEngine>,
    registry: Arc<dyn BaseDeviceRegistry>,
    priority: i32,
}

impl AutoDistributor {
    pub fn new(
        engine: Arc<DistributionEngine>,
        registry: Arc<dyn BaseDeviceRegistry>,
        priority: i32,
    ) -> Self {
        Self {
            engine,
            registry,
            priority,
        }
    }

    /// Queue `content_id` for every active device, skipping pairs that are
    /// already in flight. `None` when there was nothing to do.
    pub async fn distribute_to_fleet(
        &self,
        content_id: ContentId,
    ) -> Result<Option<DistributionOutcome>> {
        let devices = self
            .registry
            .list_active_devices()
            .await
            .context("Failed to list active devices")?;
        if devices.is_empty() {
            debug!(%content_id, "no active devices to distribute to");
            return Ok(None);
        }

        let request = DistributionRequest::builder()
            .content_ids(vec![content_id])
            .device_ids(devices)
            .priority(self.priority)
            .on_active(ActivePairPolicy::Skip)
            .build();
        match self.engine.distribute(request).await {
            Ok(outcome) => {
                info!(
                    %content_id,
                    created = outcome.created.len(),
                    skipped = outcome.skipped.len(),
                    "approved content auto-distributed"
                );
                Ok(Some(outcome))
            }
            // Archived since it was approved.
            Err(PipelineError::PreconditionFailed { violations }) if no_longer_approved(&violations) => {
                debug!(%content_id, "content no longer approved, not distributing");
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Auto-distribution failed for {}", content_id)),
        }
    }
}

fn no_longer_approved(violations: &[PreconditionViolation]) -> bool {
    violations
        .iter()
        .all(|v| matches!(v, PreconditionViolation::ContentNotApproved { .. }))
}

#[async_trait]
impl EventHandler<PipelineEvent> for AutoDistributor {
    fn name(&self) -> &'static str {
        "auto-distribution"
    }

    async fn handle(&self, envelope: &EventEnvelope<PipelineEvent>) -> Result<()> {
        let PipelineEvent::Moderation(ModerationEvent::ContentApproved { content_id, .. }) =
            &envelope.event
        else {
            return Ok(());
        };

        self.distribute_to_fleet(*content_id).await?;
        Ok(())
    }
}

/// Periodic catch-up for approvals auto-distribution never saw.
pub struct ApprovalSweeper {
    distributor: Arc<AutoDistributor>,
    store: Arc<ContentStore>,
    interval: Duration,
    grace: Duration,
}

impl ApprovalSweeper {
    pub fn new(
        distributor: Arc<AutoDistributor>,
        store: Arc<ContentStore>,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            distributor,
            store,
            interval,
            grace,
        }
    }

    /// One pass. Returns how many approved items were distributed.
    pub async fn sweep(&self) -> usize {
        let grace = chrono::Duration::from_std(self.grace)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let cutoff = Utc::now()
            .checked_sub_signed(grace)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let mut distributed = 0;
        for item in self.store.stuck_in(ContentStatus::Approved, cutoff) {
            if self.distributor.engine.has_records_for(item.id) {
                continue;
            }
            match self.distributor.distribute_to_fleet(item.id).await {
                Ok(Some(outcome)) if !outcome.created.is_empty() => distributed += 1,
                Ok(_) => {}
                Err(e) => warn!(content_id = %item.id, error = %e, "approval catch-up failed"),
            }
        }

        if distributed > 0 {
            info!(count = distributed, "distributed approvals missed by auto-distribution");
        }
        distributed
    }
}

#[async_trait]
impl Service for ApprovalSweeper {
    fn name(&self) -> &'static str {
        "approval-sweeper"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(interval = ?self.interval, grace = ?self.grace, "approval sweeper starting");
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("approval sweeper stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DeviceId, OwnerId, ReviewerId};
    use crate::domains::content::models::{NewContent, TransitionCause};
    use crate::domains::moderation::events::DecisionSource;
    use crate::kernel::event_bus::EventBus;
    use crate::kernel::test_dependencies::MockDeviceRegistry;

    fn approved_envelope(
        content_id: crate::common::ContentId,
    ) -> EventEnvelope<PipelineEvent> {
        EventEnvelope {
            sequence: 1,
            published_at: Utc::now(),
            event: ModerationEvent::ContentApproved {
                content_id,
                decided_by: DecisionSource::Reviewer {
                    reviewer_id: ReviewerId::new(),
                },
                approved_at: Utc::now(),
            }
            .into(),
        }
    }

    fn setup(registry: MockDeviceRegistry) -> (AutoDistributor, Arc<DistributionEngine>, Arc<ContentStore>) {
        let bus = EventBus::new();
        let store = Arc::new(ContentStore::new(bus.clone(), u64::MAX));
        let registry: Arc<dyn BaseDeviceRegistry> = Arc::new(registry);
        let engine = Arc::new(DistributionEngine::new(store.clone(), registry.clone(), bus));
        (AutoDistributor::new(engine.clone(), registry, 3), engine, store)
    }

    fn approve(store: &ContentStore) -> crate::common::ContentId {
        let id = store
            .ingest(
                NewContent::builder()
                    .owner_id(OwnerId::new())
                    .media_type("image/png")
                    .size_bytes(1024)
                    .storage_locator("s3://bucket/a.png")
                    .title("A")
                    .build(),
            )
            .unwrap()
            .id;
        store
            .transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion)
            .unwrap();
        store
            .transition(id, ContentStatus::Approved, TransitionCause::AutoModeration { confidence: 0.95 })
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_distributes_to_every_active_device_once() {
        let (d1, d2) = (DeviceId::new(), DeviceId::new());
        let (handler, engine, store) = setup(
            MockDeviceRegistry::new()
                .with_active_device(d1)
                .with_active_device(d2),
        );
        let content_id = approve(&store);
        let envelope = approved_envelope(content_id);

        handler.handle(&envelope).await.unwrap();
        handler.handle(&envelope).await.unwrap();

        let records = engine.records_for_content(content_id);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.priority == 3));
    }

    #[tokio::test]
    async fn test_no_active_devices_is_a_noop() {
        let (handler, engine, store) = setup(MockDeviceRegistry::new());
        let content_id = approve(&store);

        handler.handle(&approved_envelope(content_id)).await.unwrap();

        assert_eq!(engine.get_stats().total_distributions, 0);
    }

    #[tokio::test]
    async fn test_registry_outage_surfaces_as_handler_error() {
        let (handler, _engine, store) = setup(MockDeviceRegistry::new().offline());
        let content_id = approve(&store);

        assert!(handler.handle(&approved_envelope(content_id)).await.is_err());
    }

    #[tokio::test]
    async fn test_archived_before_handling_is_a_quiet_noop() {
        let d1 = DeviceId::new();
        let (handler, engine, store) = setup(MockDeviceRegistry::new().with_active_device(d1));
        let content_id = approve(&store);
        store.archive(content_id, None).unwrap();

        handler.handle(&approved_envelope(content_id)).await.unwrap();

        assert!(!engine.has_records_for(content_id));
    }

    #[tokio::test]
    async fn test_sweep_distributes_approvals_whose_event_was_lost() {
        let (d1, d2) = (DeviceId::new(), DeviceId::new());
        let (handler, engine, store) = setup(
            MockDeviceRegistry::new()
                .with_active_device(d1)
                .with_active_device(d2),
        );
        let missed = approve(&store);
        let seen = approve(&store);
        handler.handle(&approved_envelope(seen)).await.unwrap();

        let sweeper = ApprovalSweeper::new(
            Arc::new(handler),
            store.clone(),
            Duration::from_secs(30),
            Duration::ZERO,
        );
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(sweeper.sweep().await, 1);
        assert_eq!(engine.records_for_content(missed).len(), 2);
        assert_eq!(engine.records_for_content(seen).len(), 2);
        assert_eq!(sweeper.sweep().await, 0);
        assert_eq!(engine.get_stats().total_distributions, 4);
    }

    #[tokio::test]
    async fn test_sweep_waits_out_the_grace_period() {
        let d1 = DeviceId::new();
        let (handler, engine, store) = setup(MockDeviceRegistry::new().with_active_device(d1));
        let content_id = approve(&store);

        let sweeper = ApprovalSweeper::new(
            Arc::new(handler),
            store,
            Duration::from_secs(30),
            Duration::from_secs(3600),
        );

        assert_eq!(sweeper.sweep().await, 0);
        assert!(!engine.has_records_for(content_id));
    }
}

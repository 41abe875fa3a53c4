//! Distribution engine.
//!
//! Owns every `DistributionRecord`. Record creation (bulk distribute, retry,
//! auto-distribution) is serialized by one admission lock so the "one
//! active record per (content, device)" rule cannot be raced. Content status
//! is checked with the items locked in the content store, and records are
//! created before those locks drop, so archival cannot slip in between. Progress
//! updates take only the record's own map entry, so records move
//! independently of each other and of admission.
//!
//! Stats are kept as per-status counters moved in the same critical section
//! as the record itself; `total_distributions` is defined as their sum.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use super::events::DistributionEvent;
use super::machines::{self, DeliveryStep};
use super::models::{DeliveryCounters, DeliveryStatus, DistributionRecord, DistributionStats};
use crate::common::{ContentId, DeliveryId, DeviceId};
use crate::domains::content::models::ContentStatus;
use crate::domains::content::store::ContentStore;
use crate::error::{PipelineError, PreconditionViolation};
use crate::events::{publish_logged, PipelineBus};
use crate::kernel::BaseDeviceRegistry;

/// Failure reason stamped on a record replaced by a newer one.
pub const SUPERSEDED_REASON: &str = "superseded";

/// What to do when a requested pair already has an active record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivePairPolicy {
    /// Refuse the whole request.
    #[default]
    Reject,
    /// Fail the existing record and queue a replacement.
    Supersede,
    /// Leave the existing record alone and create nothing for the pair.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct DistributionRequest {
    pub content_ids: Vec<ContentId>,
    pub device_ids: Vec<DeviceId>,
    #[serde(default)]
    #[builder(default)]
    pub priority: i32,
    #[serde(default)]
    #[builder(default)]
    pub on_active: ActivePairPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAssignment {
    pub delivery_id: DeliveryId,
    pub content_id: ContentId,
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributionOutcome {
    pub created: Vec<DeliveryAssignment>,
    /// Pairs left alone under `ActivePairPolicy::Skip`, with the active record.
    pub skipped: Vec<DeliveryAssignment>,
}

pub struct DistributionEngine {
    records: DashMap<DeliveryId, DistributionRecord>,
    active_pairs: DashMap<(ContentId, DeviceId), DeliveryId>,
    /// Non-terminal records per device; every device ever targeted has an entry.
    device_load: DashMap<DeviceId, u64>,
    active_devices: AtomicU64,
    counters: DeliveryCounters,
    admission: Mutex<()>,
    content: Arc<ContentStore>,
    registry: Arc<dyn BaseDeviceRegistry>,
    bus: PipelineBus,
}

fn dedup<T: Copy + Eq + std::hash::Hash>(ids: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn check_content(
    content_id: ContentId,
    status: Option<&ContentStatus>,
) -> Option<PreconditionViolation> {
    match status {
        None => Some(PreconditionViolation::UnknownContent { content_id }),
        Some(ContentStatus::Approved) => None,
        Some(&status) => Some(PreconditionViolation::ContentNotApproved { content_id, status }),
    }
}

impl DistributionEngine {
    pub fn new(
        content: Arc<ContentStore>,
        registry: Arc<dyn BaseDeviceRegistry>,
        bus: PipelineBus,
    ) -> Self {
        Self {
            records: DashMap::new(),
            active_pairs: DashMap::new(),
            device_load: DashMap::new(),
            active_devices: AtomicU64::new(0),
            counters: DeliveryCounters::default(),
            admission: Mutex::new(()),
            content,
            registry,
            bus,
        }
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Queue every content × device pair, or nothing.
    ///
    /// All preconditions are checked before any record exists; a refusal
    /// lists every offending content id, device id and pair.
    pub async fn distribute(
        &self,
        request: DistributionRequest,
    ) -> Result<DistributionOutcome, PipelineError> {
        let content_ids = dedup(request.content_ids);
        let device_ids = dedup(request.device_ids);
        if content_ids.is_empty() || device_ids.is_empty() {
            return Err(PipelineError::precondition(PreconditionViolation::EmptyRequest));
        }

        let _admission = self.admission.lock().await;

        let mut device_violations = Vec::new();
        for &device_id in &device_ids {
            if let Some(violation) = self.check_device(device_id).await {
                device_violations.push(violation);
            }
        }

        // Content is checked and its records created with the items locked,
        // so nothing can archive them in between.
        self.content.with_statuses_locked(&content_ids, |statuses| {
            let mut violations: Vec<PreconditionViolation> = content_ids
                .iter()
                .filter_map(|&content_id| check_content(content_id, statuses.get(&content_id)))
                .collect();
            violations.extend(device_violations);

            let mut plan = Vec::new();
            let mut skipped = Vec::new();
            for &content_id in &content_ids {
                for &device_id in &device_ids {
                    let Some(delivery_id) = self.active_delivery(content_id, device_id) else {
                        plan.push((content_id, device_id, None));
                        continue;
                    };
                    match request.on_active {
                        ActivePairPolicy::Reject => {
                            violations.push(PreconditionViolation::ActiveDeliveryExists {
                                content_id,
                                device_id,
                                delivery_id,
                            })
                        }
                        ActivePairPolicy::Supersede => {
                            plan.push((content_id, device_id, Some(delivery_id)))
                        }
                        ActivePairPolicy::Skip => skipped.push(DeliveryAssignment {
                            delivery_id,
                            content_id,
                            device_id,
                        }),
                    }
                }
            }

            if !violations.is_empty() {
                warn!(
                    contents = content_ids.len(),
                    devices = device_ids.len(),
                    violations = violations.len(),
                    "distribution request refused"
                );
                return Err(PipelineError::PreconditionFailed { violations });
            }

            let created: Vec<DeliveryAssignment> = plan
                .into_iter()
                .map(|(content_id, device_id, active)| {
                    let record = self.replace(content_id, device_id, request.priority, active);
                    DeliveryAssignment {
                        delivery_id: record.id,
                        content_id,
                        device_id,
                    }
                })
                .collect();

            info!(
                created = created.len(),
                skipped = skipped.len(),
                priority = request.priority,
                "distribution queued"
            );
            Ok(DistributionOutcome { created, skipped })
        })
    }

    /// Queue a fresh record for a failed one. The old record stays failed
    /// and is linked to its replacement.
    pub async fn retry_delivery(
        &self,
        delivery_id: DeliveryId,
        priority: Option<i32>,
    ) -> Result<DistributionRecord, PipelineError> {
        let _admission = self.admission.lock().await;

        let failed = self
            .get(delivery_id)
            .ok_or_else(|| PipelineError::delivery_not_found(delivery_id))?;
        if failed.status != DeliveryStatus::Failed {
            return Err(PipelineError::precondition(
                PreconditionViolation::DeliveryNotFailed {
                    delivery_id,
                    status: failed.status,
                },
            ));
        }
        if let Some(replacement) = failed.superseded_by {
            return Err(PipelineError::precondition(
                PreconditionViolation::AlreadyRetried {
                    delivery_id,
                    replacement,
                },
            ));
        }

        let device_violation = self.check_device(failed.device_id).await;

        self.content.with_statuses_locked(&[failed.content_id], |statuses| {
            let mut violations = Vec::new();
            violations.extend(check_content(
                failed.content_id,
                statuses.get(&failed.content_id),
            ));
            violations.extend(device_violation);
            if let Some(active) = self.active_delivery(failed.content_id, failed.device_id) {
                violations.push(PreconditionViolation::ActiveDeliveryExists {
                    content_id: failed.content_id,
                    device_id: failed.device_id,
                    delivery_id: active,
                });
            }
            if !violations.is_empty() {
                return Err(PipelineError::PreconditionFailed { violations });
            }

            let record = self.create(
                failed.content_id,
                failed.device_id,
                priority.unwrap_or(failed.priority),
                Some(delivery_id),
            );
            info!(%delivery_id, replacement = %record.id, "delivery retried");
            Ok(record)
        })
    }

    async fn check_device(&self, device_id: DeviceId) -> Option<PreconditionViolation> {
        match self.registry.is_eligible(device_id).await {
            Ok(true) => None,
            Ok(false) => Some(PreconditionViolation::DeviceIneligible { device_id }),
            Err(e) => {
                warn!(%device_id, error = %e, "device registry lookup failed");
                Some(PreconditionViolation::RegistryUnavailable {
                    device_id,
                    error: format!("{:#}", e),
                })
            }
        }
    }

    // Callers hold the admission lock.
    fn create(
        &self,
        content_id: ContentId,
        device_id: DeviceId,
        priority: i32,
        supersedes: Option<DeliveryId>,
    ) -> DistributionRecord {
        let record = DistributionRecord::queued(content_id, device_id, priority, supersedes);
        let id = record.id;

        if let Some(previous) = supersedes {
            if let Some(mut old) = self.records.get_mut(&previous) {
                old.superseded_by = Some(id);
            }
        }

        // Held until the event is out so progress on this record cannot be
        // announced ahead of its creation.
        let entry = self.records.entry(id).or_insert(record);
        self.counters.record_created();
        self.active_pairs.insert((content_id, device_id), id);
        self.device_became_busier(device_id);

        debug!(delivery_id = %id, %content_id, %device_id, priority, "delivery queued");
        publish_logged(
            &self.bus,
            DistributionEvent::Queued {
                delivery_id: id,
                content_id,
                device_id,
                priority,
                supersedes,
                queued_at: entry.queued_at,
            },
        );
        entry.clone()
    }

    /// Queue a record for the pair, first failing `active` if it is still
    /// in flight. The two are linked only when `active` was actually
    /// superseded; one that finished on its own is left untouched.
    fn replace(
        &self,
        content_id: ContentId,
        device_id: DeviceId,
        priority: i32,
        active: Option<DeliveryId>,
    ) -> DistributionRecord {
        let supersedes = active.filter(|&previous| self.supersede(previous));
        self.create(content_id, device_id, priority, supersedes)
    }

    /// Whether `previous` was moved to failed by this call.
    fn supersede(&self, previous: DeliveryId) -> bool {
        match self.step(previous, DeliveryStatus::Failed, Some(SUPERSEDED_REASON.to_string())) {
            Ok((_, moved)) => moved,
            Err(PipelineError::InvalidTransition { .. }) => false,
            Err(e) => {
                warn!(delivery_id = %previous, error = %e, "could not supersede delivery");
                false
            }
        }
    }

    // =========================================================================
    // Progress
    // =========================================================================

    /// Apply device-reported progress.
    ///
    /// Re-reporting the current status is accepted and changes nothing.
    /// Backward moves and moves out of a terminal status fail with
    /// `InvalidTransition`, leaving the record as it was.
    pub fn update_delivery_status(
        &self,
        delivery_id: DeliveryId,
        status: DeliveryStatus,
        detail: Option<String>,
    ) -> Result<DistributionRecord, PipelineError> {
        self.step(delivery_id, status, detail).map(|(record, _)| record)
    }

    /// Returns the record and whether it moved.
    fn step(
        &self,
        delivery_id: DeliveryId,
        requested: DeliveryStatus,
        detail: Option<String>,
    ) -> Result<(DistributionRecord, bool), PipelineError> {
        let mut record = self
            .records
            .get_mut(&delivery_id)
            .ok_or_else(|| PipelineError::delivery_not_found(delivery_id))?;

        let current = record.status;
        match machines::check(current, requested) {
            DeliveryStep::Advance => {}
            DeliveryStep::Unchanged => {
                debug!(%delivery_id, status = %current, "delivery status re-reported");
                return Ok((record.clone(), false));
            }
            DeliveryStep::Refused => {
                return Err(PipelineError::InvalidTransition {
                    id: delivery_id.into_uuid(),
                    current: current.into(),
                    requested: requested.into(),
                })
            }
        }

        let now = Utc::now();
        record.apply(requested, detail.clone(), now);
        self.counters.record_moved(current, requested);
        if requested.is_terminal() {
            self.release_pair(record.content_id, record.device_id, delivery_id);
        }

        info!(
            %delivery_id,
            content_id = %record.content_id,
            device_id = %record.device_id,
            from = %current,
            to = %requested,
            "delivery status changed"
        );
        // Published under the record's entry lock so updates to one record
        // reach subscribers in the order they were applied.
        publish_logged(
            &self.bus,
            DistributionEvent::StatusUpdated {
                delivery_id,
                content_id: record.content_id,
                device_id: record.device_id,
                from: current,
                to: requested,
                detail,
                updated_at: now,
            },
        );

        Ok((record.clone(), true))
    }

    fn device_became_busier(&self, device_id: DeviceId) {
        let mut load = self.device_load.entry(device_id).or_insert(0);
        if *load == 0 {
            self.active_devices.fetch_add(1, Ordering::AcqRel);
        }
        *load += 1;
    }

    fn release_pair(&self, content_id: ContentId, device_id: DeviceId, delivery_id: DeliveryId) {
        self.active_pairs
            .remove_if(&(content_id, device_id), |_, active| *active == delivery_id);

        if let Some(mut load) = self.device_load.get_mut(&device_id) {
            if *load > 0 {
                *load -= 1;
                if *load == 0 {
                    self.active_devices.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, delivery_id: DeliveryId) -> Option<DistributionRecord> {
        self.records.get(&delivery_id).map(|r| r.clone())
    }

    pub fn active_delivery(&self, content_id: ContentId, device_id: DeviceId) -> Option<DeliveryId> {
        self.active_pairs.get(&(content_id, device_id)).map(|id| *id)
    }

    pub fn has_records_for(&self, content_id: ContentId) -> bool {
        self.records.iter().any(|r| r.content_id == content_id)
    }

    pub fn records_for_content(&self, content_id: ContentId) -> Vec<DistributionRecord> {
        let mut records: Vec<DistributionRecord> = self
            .records
            .iter()
            .filter(|r| r.content_id == content_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| (r.queued_at, r.id));
        records
    }

    /// Work a device should pick up next: its non-terminal records, highest
    /// priority first, then oldest.
    pub fn next_deliveries(&self, device_id: DeviceId, limit: usize) -> Vec<DistributionRecord> {
        let mut pending: Vec<DistributionRecord> = self
            .records
            .iter()
            .filter(|r| r.device_id == device_id && r.is_active())
            .map(|r| r.clone())
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.queued_at.cmp(&b.queued_at))
                .then(a.id.cmp(&b.id))
        });
        pending.truncate(limit);
        pending
    }

    /// Non-terminal records untouched for longer than `older_than`, most
    /// stale first. Reported only; nothing is failed automatically.
    pub fn stale_deliveries(&self, older_than: Duration) -> Vec<DistributionRecord> {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Vec::new();
        };

        let mut stale: Vec<DistributionRecord> = self
            .records
            .iter()
            .filter(|r| r.is_active() && r.updated_at < cutoff)
            .map(|r| r.clone())
            .collect();
        stale.sort_by_key(|r| (r.updated_at, r.id));
        stale
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// O(1) view from the incremental counters.
    pub fn get_stats(&self) -> DistributionStats {
        DistributionStats::from_counts(
            self.counters.snapshot(),
            self.device_load.len() as u64,
            self.active_devices.load(Ordering::Acquire),
            self.content.counts(),
        )
    }

    /// The same view computed from the records alone.
    pub fn recompute_stats(&self) -> DistributionStats {
        let mut counts = [0u64; 5];
        let mut devices: HashMap<DeviceId, bool> = HashMap::new();

        for record in self.records.iter() {
            counts[record.status.index()] += 1;
            let busy = devices.entry(record.device_id).or_insert(false);
            *busy |= record.is_active();
        }

        DistributionStats::from_counts(
            counts,
            devices.len() as u64,
            devices.values().filter(|busy| **busy).count() as u64,
            self.content.recompute_counts(),
        )
    }
}

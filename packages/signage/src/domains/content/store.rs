//! Authoritative content state.
//!
//! An arena of items indexed by id, each behind its own lock. Every status
//! change goes through [`ContentStore::transition`] (or its review-carrying
//! variants), which holds the item's lock while it validates, applies,
//! updates the status counters and publishes `content_status_changed`. Two
//! transitions on one id therefore never interleave, and the bus sees
//! status changes for an id in the order they were applied.
//!
//! Events that follow from a change (moderation decisions) are published
//! from [`ContentStore::transition_announcing`] under the same lock, so a
//! later change to the item cannot be announced ahead of them.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use super::events::ContentEvent;
use super::machines;
use super::models::{
    ContentItem, ContentStatus, ContentStatusCounts, NewContent, StatusChange, TransitionCause,
};
use crate::common::ContentId;
use crate::domains::moderation::models::ReviewRecord;
use crate::error::PipelineError;
use crate::events::{publish_logged, PipelineBus};

type Slot = Arc<Mutex<ContentItem>>;

fn lock(slot: &Slot) -> MutexGuard<'_, ContentItem> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ContentStore {
    items: DashMap<ContentId, Slot>,
    counts: [AtomicU64; 6],
    bus: PipelineBus,
    max_upload_bytes: u64,
}

impl ContentStore {
    pub fn new(bus: PipelineBus, max_upload_bytes: u64) -> Self {
        Self {
            items: DashMap::new(),
            counts: Default::default(),
            bus,
            max_upload_bytes,
        }
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Register an upload and announce it.
    ///
    /// Re-ingesting a known id returns the existing item untouched and
    /// publishes nothing.
    pub fn ingest(&self, new: NewContent) -> Result<ContentItem, PipelineError> {
        self.validate(&new)?;

        let now = Utc::now();
        let item = ContentItem {
            id: new.id,
            owner_id: new.owner_id,
            media_type: new.media_type,
            size_bytes: new.size_bytes,
            storage_locator: new.storage_locator,
            title: new.title,
            description: new.description,
            tags: new
                .tags
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<BTreeSet<_>>(),
            status: ContentStatus::Uploaded,
            review: None,
            history: vec![StatusChange {
                from: None,
                to: ContentStatus::Uploaded,
                cause: TransitionCause::Ingestion,
                at: now,
            }],
            created_at: now,
            updated_at: now,
        };

        match self.items.entry(item.id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let existing = lock(existing.get()).clone();
                debug!(content_id = %existing.id, status = %existing.status, "content already ingested");
                return Ok(existing);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(item.clone())));
            }
        }
        self.counts[ContentStatus::Uploaded.index()].fetch_add(1, Ordering::AcqRel);

        info!(
            content_id = %item.id,
            owner_id = %item.owner_id,
            media_type = %item.media_type,
            size_bytes = item.size_bytes,
            "content ingested"
        );
        publish_logged(&self.bus, Self::uploaded_event(&item));

        Ok(item)
    }

    fn validate(&self, new: &NewContent) -> Result<(), PipelineError> {
        let mut parts = new.media_type.splitn(2, '/');
        let kind = parts.next().unwrap_or_default();
        let subtype = parts.next().unwrap_or_default();
        if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(PipelineError::Validation(format!(
                "media type must look like type/subtype, got {:?}",
                new.media_type
            )));
        }
        if new.size_bytes == 0 {
            return Err(PipelineError::Validation("content is empty".to_string()));
        }
        if new.size_bytes > self.max_upload_bytes {
            return Err(PipelineError::Validation(format!(
                "content is {} bytes, limit is {}",
                new.size_bytes, self.max_upload_bytes
            )));
        }
        if new.storage_locator.trim().is_empty() {
            return Err(PipelineError::Validation(
                "storage locator is required".to_string(),
            ));
        }
        if new.title.trim().is_empty() {
            return Err(PipelineError::Validation("title is required".to_string()));
        }
        Ok(())
    }

    pub(crate) fn uploaded_event(item: &ContentItem) -> ContentEvent {
        ContentEvent::Uploaded {
            content_id: item.id,
            owner_id: item.owner_id,
            media_type: item.media_type.clone(),
            size_bytes: item.size_bytes,
            storage_locator: item.storage_locator.clone(),
            uploaded_at: item.created_at,
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move an item to `target`. Fails with `InvalidTransition` (carrying
    /// the current and requested status) when the edge or cause is not
    /// allowed.
    pub fn transition(
        &self,
        id: ContentId,
        target: ContentStatus,
        cause: TransitionCause,
    ) -> Result<ContentItem, PipelineError> {
        self.apply(id, target, cause, |_| {}, |_| {})
    }

    /// Transition and attach a review record in the same step.
    pub fn transition_with_review(
        &self,
        id: ContentId,
        target: ContentStatus,
        cause: TransitionCause,
        review: ReviewRecord,
    ) -> Result<ContentItem, PipelineError> {
        self.apply(id, target, cause, move |slot| *slot = Some(review), |_| {})
    }

    /// Transition, editing the review record in place, then run `announce`
    /// on the updated item before its lock is released.
    pub fn transition_announcing<F, A>(
        &self,
        id: ContentId,
        target: ContentStatus,
        cause: TransitionCause,
        amend: F,
        announce: A,
    ) -> Result<ContentItem, PipelineError>
    where
        F: FnOnce(&mut Option<ReviewRecord>),
        A: FnOnce(&ContentItem),
    {
        self.apply(id, target, cause, amend, announce)
    }

    pub fn archive(&self, id: ContentId, actor: Option<String>) -> Result<ContentItem, PipelineError> {
        self.transition(id, ContentStatus::Archived, TransitionCause::Archival { actor })
    }

    fn apply<F, A>(
        &self,
        id: ContentId,
        target: ContentStatus,
        cause: TransitionCause,
        amend: F,
        announce: A,
    ) -> Result<ContentItem, PipelineError>
    where
        F: FnOnce(&mut Option<ReviewRecord>),
        A: FnOnce(&ContentItem),
    {
        let slot = self
            .slot(id)
            .ok_or_else(|| PipelineError::content_not_found(id))?;
        let mut item = lock(&slot);

        let current = item.status;
        if !machines::is_allowed(current, target, &cause) {
            return Err(PipelineError::InvalidTransition {
                id: id.into_uuid(),
                current: current.into(),
                requested: target.into(),
            });
        }

        let now = Utc::now();
        amend(&mut item.review);
        item.status = target;
        item.updated_at = now;
        item.history.push(StatusChange {
            from: Some(current),
            to: target,
            cause: cause.clone(),
            at: now,
        });

        self.counts[target.index()].fetch_add(1, Ordering::AcqRel);
        self.counts[current.index()].fetch_sub(1, Ordering::AcqRel);

        info!(
            content_id = %id,
            from = %current,
            to = %target,
            cause = cause.kind(),
            "content status changed"
        );
        publish_logged(
            &self.bus,
            ContentEvent::StatusChanged {
                content_id: id,
                from: current,
                to: target,
                cause,
                changed_at: now,
            },
        );
        announce(&item);

        Ok(item.clone())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn slot(&self, id: ContentId) -> Option<Slot> {
        self.items.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get(&self, id: ContentId) -> Option<ContentItem> {
        self.slot(id).map(|slot| lock(&slot).clone())
    }

    pub fn status(&self, id: ContentId) -> Option<ContentStatus> {
        self.slot(id).map(|slot| lock(&slot).status)
    }

    /// Run `f` with every listed item locked, so none of them can change
    /// status until it returns. Unknown ids are absent from the map.
    ///
    /// Locks are taken in id order; `f` must not transition these items.
    pub fn with_statuses_locked<R>(
        &self,
        ids: &[ContentId],
        f: impl FnOnce(&HashMap<ContentId, ContentStatus>) -> R,
    ) -> R {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let slots: Vec<(ContentId, Slot)> = ids
            .into_iter()
            .filter_map(|id| self.slot(id).map(|slot| (id, slot)))
            .collect();
        let guards: Vec<(ContentId, MutexGuard<'_, ContentItem>)> =
            slots.iter().map(|(id, slot)| (*id, lock(slot))).collect();
        let statuses: HashMap<ContentId, ContentStatus> =
            guards.iter().map(|(id, item)| (*id, item.status)).collect();

        f(&statuses)
    }

    pub fn contains(&self, id: ContentId) -> bool {
        self.items.contains_key(&id)
    }

    /// Items in `status`, oldest upload first.
    pub fn list_by_status(&self, status: ContentStatus) -> Vec<ContentItem> {
        let mut items: Vec<ContentItem> = self
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let item = lock(&slot);
                (item.status == status).then(|| item.clone())
            })
            .collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        items
    }

    /// Items that have sat in `status` since before `cutoff`.
    pub fn stuck_in(&self, status: ContentStatus, cutoff: DateTime<Utc>) -> Vec<ContentItem> {
        self.list_by_status(status)
            .into_iter()
            .filter(|item| item.status_since() < cutoff)
            .collect()
    }

    // Clone the Arcs out so no map shard is held while item locks are taken.
    fn slots(&self) -> Vec<Slot> {
        self.items.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Incrementally maintained counts.
    pub fn counts(&self) -> ContentStatusCounts {
        let mut counts = ContentStatusCounts::default();
        for status in ContentStatus::ALL {
            *counts.slot(status) = self.counts[status.index()].load(Ordering::Acquire);
        }
        counts
    }

    /// Count straight from the items, bypassing the counters.
    pub fn recompute_counts(&self) -> ContentStatusCounts {
        let mut tally: HashMap<ContentStatus, u64> = HashMap::new();
        for slot in self.slots() {
            *tally.entry(lock(&slot).status).or_insert(0) += 1;
        }

        let mut counts = ContentStatusCounts::default();
        for status in ContentStatus::ALL {
            *counts.slot(status) = tally.get(&status).copied().unwrap_or(0);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OwnerId, ReviewerId};
    use crate::domains::moderation::models::ModerationAction;
    use crate::events::PipelineEvent;
    use crate::kernel::event_bus::{EventBus, Subscription};
    use crate::kernel::ModerationAnalysis;

    fn store() -> (ContentStore, Subscription<PipelineEvent>) {
        let bus = EventBus::new();
        let sub = bus.subscribe("test");
        (ContentStore::new(bus, 1024 * 1024), sub)
    }

    fn upload() -> NewContent {
        NewContent::builder()
            .owner_id(OwnerId::new())
            .media_type("image/png")
            .size_bytes(1024)
            .storage_locator("s3://bucket/c1.png")
            .title("C1")
            .tags(vec!["Promo".into(), " promo ".into(), "".into()])
            .build()
    }

    fn review() -> ReviewRecord {
        ReviewRecord::scored(
            0.5,
            ModerationAction::Escalated,
            ModerationAnalysis::default(),
            1,
        )
    }

    #[test]
    fn test_ingest_creates_uploaded_item_and_publishes() {
        let (store, mut sub) = store();

        let item = store.ingest(upload()).unwrap();

        assert_eq!(item.status, ContentStatus::Uploaded);
        assert_eq!(item.tags.len(), 1);
        assert_eq!(item.history.len(), 1);
        assert_eq!(store.counts().uploaded, 1);
        assert!(matches!(
            sub.try_recv().unwrap().event,
            PipelineEvent::Content(ContentEvent::Uploaded { .. })
        ));
    }

    #[test]
    fn test_reingest_is_a_no_op() {
        let (store, mut sub) = store();
        let new = upload();

        store.ingest(new.clone()).unwrap();
        sub.try_recv().unwrap();
        let again = store.ingest(new).unwrap();

        assert_eq!(again.status, ContentStatus::Uploaded);
        assert_eq!(store.len(), 1);
        assert_eq!(store.counts().uploaded, 1);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_ingest_validation() {
        let (store, _sub) = store();

        let bad_type = NewContent { media_type: "png".into(), ..upload() };
        let empty = NewContent { size_bytes: 0, ..upload() };
        let huge = NewContent { size_bytes: 2 * 1024 * 1024, ..upload() };
        let no_locator = NewContent { storage_locator: "  ".into(), ..upload() };

        for new in [bad_type, empty, huge, no_locator] {
            assert!(matches!(store.ingest(new), Err(PipelineError::Validation(_))));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_valid_transition_updates_history_and_counts() {
        let (store, mut sub) = store();
        let id = store.ingest(upload()).unwrap().id;
        sub.try_recv();

        let item = store
            .transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion)
            .unwrap();

        assert_eq!(item.status, ContentStatus::Quarantined);
        assert_eq!(item.history.last().unwrap().from, Some(ContentStatus::Uploaded));
        assert_eq!(store.counts().uploaded, 0);
        assert_eq!(store.counts().quarantined, 1);
        match sub.try_recv().unwrap().event {
            PipelineEvent::Content(ContentEvent::StatusChanged { from, to, .. }) => {
                assert_eq!(from, ContentStatus::Uploaded);
                assert_eq!(to, ContentStatus::Quarantined);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_invalid_transition_reports_statuses_and_changes_nothing() {
        let (store, _sub) = store();
        let id = store.ingest(upload()).unwrap().id;

        let err = store
            .transition(id, ContentStatus::Approved, TransitionCause::AutoModeration { confidence: 1.0 })
            .unwrap_err();

        match err {
            PipelineError::InvalidTransition { current, requested, .. } => {
                assert_eq!(current.to_string(), "uploaded");
                assert_eq!(requested.to_string(), "approved");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(store.status(id), Some(ContentStatus::Uploaded));
        assert_eq!(store.get(id).unwrap().history.len(), 1);
    }

    #[test]
    fn test_unknown_content_is_not_found() {
        let (store, _sub) = store();
        assert!(matches!(
            store.transition(ContentId::new(), ContentStatus::Quarantined, TransitionCause::Ingestion),
            Err(PipelineError::NotFound { entity: "content", .. })
        ));
    }

    #[test]
    fn test_review_attached_with_transition() {
        let (store, _sub) = store();
        let id = store.ingest(upload()).unwrap().id;
        store
            .transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion)
            .unwrap();

        let item = store
            .transition_with_review(
                id,
                ContentStatus::PendingReview,
                TransitionCause::AutoModeration { confidence: 0.5 },
                review(),
            )
            .unwrap();

        assert_eq!(item.review.unwrap().confidence, Some(0.5));
    }

    #[test]
    fn test_archive_requires_final_status() {
        let (store, _sub) = store();
        let id = store.ingest(upload()).unwrap().id;
        assert!(store.archive(id, Some("ops".into())).is_err());

        store.transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion).unwrap();
        store
            .transition(id, ContentStatus::PendingReview, TransitionCause::AutoModeration { confidence: 0.5 })
            .unwrap();
        store
            .transition(
                id,
                ContentStatus::Rejected,
                TransitionCause::HumanDecision { reviewer_id: ReviewerId::new() },
            )
            .unwrap();

        let archived = store.archive(id, Some("ops".into())).unwrap();
        assert_eq!(archived.status, ContentStatus::Archived);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let (store, _sub) = store();
        let store = Arc::new(store);
        let id = store.ingest(upload()).unwrap().id;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion)
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(store.get(id).unwrap().history.len(), 2);
        assert_eq!(store.counts().total(), 1);
    }

    #[test]
    fn test_recompute_matches_incremental_counts() {
        let (store, _sub) = store();
        for _ in 0..3 {
            store.ingest(NewContent { id: ContentId::new(), ..upload() }).unwrap();
        }
        let id = store.ingest(upload()).unwrap().id;
        store.transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion).unwrap();

        let incremental = store.counts();
        assert_eq!(store.recompute_counts(), incremental);
        assert_eq!(incremental.uploaded, 3);
        assert_eq!(incremental.quarantined, 1);
    }

    #[test]
    fn test_list_by_status_oldest_first() {
        let (store, _sub) = store();
        let first = store.ingest(NewContent { id: ContentId::new(), ..upload() }).unwrap();
        let second = store.ingest(NewContent { id: ContentId::new(), ..upload() }).unwrap();

        let listed: Vec<ContentId> = store
            .list_by_status(ContentStatus::Uploaded)
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(listed, vec![first.id, second.id]);
    }

    fn approved(store: &ContentStore) -> ContentId {
        let id = store.ingest(NewContent { id: ContentId::new(), ..upload() }).unwrap().id;
        store.transition(id, ContentStatus::Quarantined, TransitionCause::Ingestion).unwrap();
        store
            .transition(id, ContentStatus::Approved, TransitionCause::AutoModeration { confidence: 0.99 })
            .unwrap();
        id
    }

    #[test]
    fn test_announce_sees_the_applied_change() {
        let (store, _sub) = store();
        let id = store.ingest(upload()).unwrap().id;
        let mut seen = None;

        store
            .transition_announcing(
                id,
                ContentStatus::Quarantined,
                TransitionCause::Ingestion,
                |_| {},
                |item| seen = Some((item.status, item.history.len())),
            )
            .unwrap();

        assert_eq!(seen, Some((ContentStatus::Quarantined, 2)));
    }

    #[test]
    fn test_announce_skipped_when_transition_refused() {
        let (store, _sub) = store();
        let id = store.ingest(upload()).unwrap().id;
        let mut called = false;

        let result = store.transition_announcing(
            id,
            ContentStatus::Archived,
            TransitionCause::Archival { actor: None },
            |_| {},
            |_| called = true,
        );

        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn test_locked_statuses_hold_off_archival() {
        let (store, _sub) = store();
        let store = Arc::new(store);
        let id = approved(&store);
        let unknown = ContentId::new();

        let archiver = store.with_statuses_locked(&[id, unknown, id], |statuses| {
            assert_eq!(statuses.len(), 1);
            assert_eq!(statuses.get(&id), Some(&ContentStatus::Approved));

            let background = store.clone();
            let archiver = std::thread::spawn(move || background.archive(id, None));
            std::thread::sleep(std::time::Duration::from_millis(30));
            assert!(!archiver.is_finished());
            archiver
        });

        assert!(archiver.join().unwrap().is_ok());
        assert_eq!(store.status(id), Some(ContentStatus::Archived));
    }
}

//! In-process event bus with bounded, per-subscriber buffers.
//!
//! # Guarantees
//!
//! - **Non-blocking publish**: `publish` never awaits. Each subscriber owns a
//!   bounded FIFO; a full buffer is handled by the bus's [`OverflowPolicy`]
//!   instead of stalling the producer.
//! - **Publish order per subscriber**: every subscriber sees events in the
//!   order they were published, so events for one content id are always
//!   observed in order. Nothing is promised across subscribers.
//! - **At-least-once with recovery**: an event refused or evicted on overflow
//!   is counted and logged. Entity status fields stay authoritative, and the
//!   upload reaper re-publishes anything left behind, so handlers must be
//!   idempotent.
//!
//! # Overflow
//!
//! - [`OverflowPolicy::Reject`] (default): the saturated subscriber does not
//!   receive the event and `publish` returns [`PublishError::Full`] naming it.
//!   Other subscribers still get the event.
//! - [`OverflowPolicy::DropOldest`]: the oldest buffered event is evicted to
//!   make room, and the subscriber's `dropped()` counter is bumped.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::<PipelineEvent>::new();
//! let mut moderation = bus.subscribe("moderation");
//!
//! bus.publish(ContentEvent::Uploaded { .. }.into())?;
//!
//! let envelope = moderation.recv().await.expect("bus open");
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

/// Default per-subscriber buffer size.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A fact travelling over the bus.
pub trait Event: Clone + Send + Sync + 'static {
    /// Entity the event concerns. Consumers serialize handling per key.
    fn ordering_key(&self) -> Uuid;

    /// Stable name for logs and notifications.
    fn name(&self) -> &'static str;
}

/// What to do when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the event for that subscriber and report it to the producer.
    #[default]
    Reject,
    /// Evict the subscriber's oldest buffered event.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Reject => write!(f, "reject"),
            OverflowPolicy::DropOldest => write!(f, "drop_oldest"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(OverflowPolicy::Reject),
            "drop_oldest" | "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            other => Err(anyhow::anyhow!("Invalid overflow policy: {}", other)),
        }
    }
}

/// An event plus the metadata the bus stamps on it.
#[derive(Debug, Clone)]
pub struct EventEnvelope<E> {
    /// Bus-wide publish sequence number (monotonic).
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    pub event: E,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("event bus is closed")]
    Closed,

    #[error("subscriber buffer full for [{}] (delivered to {delivered})", .subscribers.join(", "))]
    Full {
        subscribers: Vec<String>,
        delivered: usize,
    },
}

struct SubscriberQueue<E> {
    name: String,
    buffer: Mutex<VecDeque<EventEnvelope<E>>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
    rejected: AtomicU64,
    closed: AtomicBool,
}

impl<E> SubscriberQueue<E> {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope<E>>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

struct BusShared<E> {
    subscribers: RwLock<Vec<Arc<SubscriberQueue<E>>>>,
    capacity: usize,
    policy: OverflowPolicy,
    sequence: AtomicU64,
    closed: AtomicBool,
}

/// Cloneable handle to a shared bus.
pub struct EventBus<E> {
    shared: Arc<BusShared<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, OverflowPolicy::default())
    }

    /// `capacity` is per subscriber and is clamped to at least 1.
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            shared: Arc::new(BusShared {
                subscribers: RwLock::new(Vec::new()),
                capacity: capacity.max(1),
                policy,
                sequence: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Publish to every live subscriber without waiting.
    ///
    /// Returns the number of subscribers that buffered the event.
    pub fn publish(&self, event: E) -> Result<usize, PublishError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }

        let envelope = EventEnvelope {
            sequence: self.shared.sequence.fetch_add(1, Ordering::AcqRel),
            published_at: Utc::now(),
            event,
        };

        let subscribers = self
            .shared
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut delivered = 0;
        let mut saturated = Vec::new();

        for queue in subscribers.iter().filter(|q| !q.is_closed()) {
            {
                let mut buffer = queue.buffer();
                if buffer.len() >= queue.capacity {
                    match self.shared.policy {
                        OverflowPolicy::Reject => {
                            queue.rejected.fetch_add(1, Ordering::Relaxed);
                            saturated.push(queue.name.clone());
                            continue;
                        }
                        OverflowPolicy::DropOldest => {
                            if let Some(evicted) = buffer.pop_front() {
                                queue.dropped.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    subscriber = %queue.name,
                                    sequence = evicted.sequence,
                                    event = evicted.event.name(),
                                    "subscriber buffer full, evicted oldest event"
                                );
                            }
                        }
                    }
                }
                buffer.push_back(envelope.clone());
            }
            queue.notify.notify_one();
            delivered += 1;
        }

        if saturated.is_empty() {
            Ok(delivered)
        } else {
            warn!(
                subscribers = ?saturated,
                event = envelope.event.name(),
                key = %envelope.event.ordering_key(),
                "subscriber buffer full, event rejected"
            );
            Err(PublishError::Full {
                subscribers: saturated,
                delivered,
            })
        }
    }

    /// Register a named subscriber. Only events published afterwards are seen.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription<E> {
        let queue = Arc::new(SubscriberQueue::new(name.into(), self.shared.capacity));
        if self.shared.closed.load(Ordering::Acquire) {
            queue.close();
        }

        let mut subscribers = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|q| !q.is_closed());
        subscribers.push(queue.clone());

        Subscription { queue }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|q| !q.is_closed())
            .count()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.shared.policy
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Stop accepting events. Subscribers drain what is buffered, then
    /// `recv` returns `None`.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let subscribers = self
            .shared
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for queue in subscribers.iter() {
            queue.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.shared.capacity)
            .field("policy", &self.shared.policy)
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Receiving end owned by one consumer. Dropping it unsubscribes.
pub struct Subscription<E> {
    queue: Arc<SubscriberQueue<E>>,
}

impl<E> Subscription<E> {
    /// Wait for the next event. `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<EventEnvelope<E>> {
        loop {
            let notified = self.queue.notify.notified();
            let next = self.queue.buffer().pop_front();
            if let Some(envelope) = next {
                return Some(envelope);
            }
            if self.queue.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    pub fn try_recv(&mut self) -> Option<EventEnvelope<E>> {
        self.queue.buffer().pop_front()
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Events currently buffered.
    pub fn len(&self) -> usize {
        self.queue.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events evicted under `DropOldest`.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Events refused under `Reject`.
    pub fn rejected(&self) -> u64 {
        self.queue.rejected.load(Ordering::Relaxed)
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.queue.name)
            .field("dropped", &self.dropped())
            .field("rejected", &self.rejected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping {
        key: Uuid,
        n: u32,
    }

    impl Event for Ping {
        fn ordering_key(&self) -> Uuid {
            self.key
        }

        fn name(&self) -> &'static str {
            "ping"
        }
    }

    fn ping(n: u32) -> Ping {
        Ping {
            key: Uuid::nil(),
            n,
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("test");

        assert_eq!(bus.publish(ping(7)).unwrap(), 1);

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.event.n, 7);
        assert_eq!(envelope.sequence, 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.publish(ping(1)).unwrap();

        assert_eq!(a.recv().await.unwrap().event.n, 1);
        assert_eq!(b.recv().await.unwrap().event.n, 1);
    }

    #[tokio::test]
    async fn test_events_for_same_key_keep_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("ordered");
        let key = Uuid::new_v4();

        for n in 0..100 {
            bus.publish(Ping { key, n }).unwrap();
        }

        for expected in 0..100 {
            assert_eq!(sub.recv().await.unwrap().event.n, expected);
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(ping(1)).unwrap();

        let mut sub = bus.subscribe("late");
        bus.publish(ping(2)).unwrap();

        assert_eq!(sub.recv().await.unwrap().event.n, 2);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_reject_policy_refuses_when_full_and_reports_subscriber() {
        let bus = EventBus::with_capacity(2, OverflowPolicy::Reject);
        let mut slow = bus.subscribe("slow");
        let mut fast = bus.subscribe("fast");

        bus.publish(ping(1)).unwrap();
        bus.publish(ping(2)).unwrap();
        // Fast consumer keeps up, slow does not.
        fast.try_recv().unwrap();
        fast.try_recv().unwrap();

        let err = bus.publish(ping(3)).unwrap_err();
        assert_eq!(
            err,
            PublishError::Full {
                subscribers: vec!["slow".to_string()],
                delivered: 1,
            }
        );
        assert_eq!(slow.rejected(), 1);

        // Slow subscriber kept the original two, in order.
        assert_eq!(slow.try_recv().unwrap().event.n, 1);
        assert_eq!(slow.try_recv().unwrap().event.n, 2);
        assert!(slow.try_recv().is_none());
        assert_eq!(fast.try_recv().unwrap().event.n, 3);
    }

    #[test]
    fn test_drop_oldest_policy_evicts_and_counts() {
        let bus = EventBus::with_capacity(2, OverflowPolicy::DropOldest);
        let mut sub = bus.subscribe("lossy");

        for n in 1..=4 {
            assert_eq!(bus.publish(ping(n)).unwrap(), 1);
        }

        assert_eq!(sub.dropped(), 2);
        assert_eq!(sub.try_recv().unwrap().event.n, 3);
        assert_eq!(sub.try_recv().unwrap().event.n, 4);
    }

    #[test]
    fn test_publish_does_not_block_with_stalled_consumer() {
        let bus = EventBus::with_capacity(1, OverflowPolicy::Reject);
        let _stalled = bus.subscribe("stalled");

        // Completes synchronously even though nobody drains.
        for n in 0..1_000 {
            let _ = bus.publish(ping(n));
        }
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("closing");
        bus.publish(ping(1)).unwrap();
        bus.close();

        assert_eq!(bus.publish(ping(2)), Err(PublishError::Closed));
        assert_eq!(sub.recv().await.unwrap().event.n, 1);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("waiter");

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(ping(42)).unwrap();
        });

        let envelope = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("recv should wake")
            .unwrap();
        assert_eq!(envelope.event.n, 42);
    }

    #[test]
    fn test_dropped_subscription_stops_receiving() {
        let bus = EventBus::new();
        let sub = bus.subscribe("gone");
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(ping(1)).unwrap(), 0);
    }

    #[test]
    fn test_overflow_policy_parses_env_values() {
        assert_eq!(
            "drop_oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldest
        );
        assert_eq!(
            " Reject ".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::Reject
        );
        assert!("block".parse::<OverflowPolicy>().is_err());
    }
}

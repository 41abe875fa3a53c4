//! Keyed worker pool for bus subscribers.
//!
//! A router task drains one [`Subscription`] and hands each envelope to a
//! lane chosen by hashing the event's ordering key. Lanes process their
//! queue sequentially, so events for one content id are handled one at a
//! time and in publish order, while distinct ids spread across lanes and run
//! concurrently.
//!
//! ```text
//! Subscription ──► router ──hash(key) % N──► lane 0 ──► handler
//!                                        ├──► lane 1 ──► handler
//!                                        └──► lane N-1 ─► handler
//! ```
//!
//! Handler errors and panics are logged and the lane moves on. Stopping the
//! pool (cancellation or bus close) lets lanes finish what they already hold.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::event_bus::{Event, EventEnvelope, Subscription};

/// Envelopes a lane may hold before the router waits on it.
const DEFAULT_LANE_CAPACITY: usize = 256;

/// Reacts to bus events. Must tolerate redelivery of the same event.
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &EventEnvelope<E>) -> Result<()>;
}

/// Long-running background task with cooperative shutdown.
#[async_trait]
pub trait Service: Send + 'static {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// Pick the lane for an ordering key.
pub fn lane_for(key: &Uuid, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes.max(1) as u64) as usize
}

pub struct KeyedWorkerPool<E: Event> {
    subscription: Subscription<E>,
    handler: Arc<dyn EventHandler<E>>,
    lanes: usize,
    lane_capacity: usize,
}

impl<E: Event> KeyedWorkerPool<E> {
    pub fn new(
        subscription: Subscription<E>,
        handler: Arc<dyn EventHandler<E>>,
        lanes: usize,
    ) -> Self {
        Self {
            subscription,
            handler,
            lanes: lanes.max(1),
            lane_capacity: DEFAULT_LANE_CAPACITY,
        }
    }

    pub fn with_lane_capacity(mut self, capacity: usize) -> Self {
        self.lane_capacity = capacity.max(1);
        self
    }

    /// Run the pool on the current runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let name = self.handler.name();
        tokio::spawn(async move {
            if let Err(e) = Box::new(self).run(shutdown).await {
                error!(handler = name, error = %e, "worker pool stopped with error");
            }
        })
    }

    fn spawn_lane(
        handler: Arc<dyn EventHandler<E>>,
        lane: usize,
        mut rx: mpsc::Receiver<EventEnvelope<E>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let outcome = std::panic::AssertUnwindSafe(handler.handle(&envelope))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(
                        handler = handler.name(),
                        lane,
                        sequence = envelope.sequence,
                        event = envelope.event.name(),
                        key = %envelope.event.ordering_key(),
                        error = %e,
                        "event handler failed"
                    ),
                    Err(panic) => error!(
                        handler = handler.name(),
                        lane,
                        sequence = envelope.sequence,
                        event = envelope.event.name(),
                        panic = %panic_message(&panic),
                        "event handler panicked"
                    ),
                }
            }
            debug!(handler = handler.name(), lane, "lane drained");
        })
    }
}

#[async_trait]
impl<E: Event> Service for KeyedWorkerPool<E> {
    fn name(&self) -> &'static str {
        self.handler.name()
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        let KeyedWorkerPool {
            mut subscription,
            handler,
            lanes,
            lane_capacity,
        } = *self;

        info!(handler = handler.name(), lanes, "worker pool starting");

        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(lane_capacity);
            senders.push(tx);
            workers.push(Self::spawn_lane(handler.clone(), lane, rx));
        }

        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = subscription.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let lane = lane_for(&envelope.event.ordering_key(), lanes);
            if senders[lane].send(envelope).await.is_err() {
                error!(handler = handler.name(), lane, "lane closed unexpectedly");
                break;
            }
        }

        drop(senders);
        for worker in workers {
            let _ = worker.await;
        }

        info!(handler = handler.name(), "worker pool stopped");
        Ok(())
    }
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Topic-keyed broadcast hub feeding the SSE endpoints.
//!
//! Notifications land here through the stream sink and fan out to whoever
//! is watching a topic:
//!
//! - `dashboard` sees everything
//! - `content:{id}` sees one item's lifecycle and its deliveries
//! - `device:{id}` sees deliveries targeting one screen
//!
//! Payloads are plain JSON. A topic with no watchers swallows the message.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::common::{ContentId, DeviceId};

pub const DASHBOARD_TOPIC: &str = "dashboard";

const DEFAULT_TOPIC_CAPACITY: usize = 256;

pub fn content_topic(id: ContentId) -> String {
    format!("content:{}", id)
}

pub fn device_topic(id: DeviceId) -> String {
    format!("device:{}", id)
}

#[derive(Clone)]
pub struct StreamHub {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// `capacity` bounds each topic's ring; lagging watchers skip ahead.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Send to a topic's watchers. Returns how many received it.
    pub async fn publish(&self, topic: &str, value: serde_json::Value) -> usize {
        let topics = self.topics.read().await;
        match topics.get(topic) {
            Some(tx) => tx.send(value).unwrap_or(0),
            None => 0,
        }
    }

    /// Watch a topic, creating it on first use.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// Forget topics nobody is watching.
    pub async fn cleanup(&self) {
        self.topics
            .write()
            .await
            .retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_watcher_receives_topic_messages() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe(DASHBOARD_TOPIC).await;

        let value = json!({"type": "content_uploaded"});
        assert_eq!(hub.publish(DASHBOARD_TOPIC, value.clone()).await, 1);
        assert_eq!(rx.recv().await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_unwatched_topic_swallows_message() {
        let hub = StreamHub::new();
        assert_eq!(hub.publish("content:nobody", json!({})).await, 0);
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = StreamHub::new();
        let a = ContentId::new();
        let b = ContentId::new();
        let mut rx_a = hub.subscribe(&content_topic(a)).await;
        let _rx_b = hub.subscribe(&content_topic(b)).await;

        hub.publish(&content_topic(b), json!({"for": "b"})).await;
        hub.publish(&content_topic(a), json!({"for": "a"})).await;

        assert_eq!(rx_a.recv().await.unwrap(), json!({"for": "a"}));
    }

    #[tokio::test]
    async fn test_cleanup_drops_unwatched_topics() {
        let hub = StreamHub::new();
        let rx = hub.subscribe(&device_topic(DeviceId::new())).await;
        assert_eq!(hub.topic_count().await, 1);

        drop(rx);
        hub.cleanup().await;
        assert_eq!(hub.topic_count().await, 0);
    }
}

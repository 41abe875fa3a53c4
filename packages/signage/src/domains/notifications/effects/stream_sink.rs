use anyhow::Result;
use async_trait::async_trait;

use crate::domains::notifications::models::Notification;
use crate::kernel::stream_hub::{content_topic, device_topic, StreamHub, DASHBOARD_TOPIC};
use crate::kernel::BaseNotificationSink;

/// Pushes notifications onto the live-stream topics.
pub struct StreamHubSink {
    hub: StreamHub,
}

impl StreamHubSink {
    pub fn new(hub: StreamHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl BaseNotificationSink for StreamHubSink {
    fn name(&self) -> &str {
        "stream-hub"
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let json = notification.to_json();
        self.hub.publish(DASHBOARD_TOPIC, json.clone()).await;
        self.hub
            .publish(&content_topic(notification.content_id), json.clone())
            .await;
        if let Some(device_id) = notification.device_id {
            self.hub.publish(&device_topic(device_id), json).await;
        }
        Ok(())
    }
}

//! Best-effort delivery of every bus event to the registered sinks.
//!
//! Each sink gets the notification in its own task with its own timeout.
//! A slow or failing sink is logged and forgotten; it never fails the
//! handler and never holds up the other sinks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::domains::notifications::models::Notification;
use crate::events::PipelineEvent;
use crate::kernel::event_bus::EventEnvelope;
use crate::kernel::worker::EventHandler;
use crate::kernel::BaseNotificationSink;

pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct NotificationFanout {
    sinks: Vec<Arc<dyn BaseNotificationSink>>,
    timeout: Duration,
}

impl NotificationFanout {
    pub fn new(sinks: Vec<Arc<dyn BaseNotificationSink>>) -> Self {
        Self {
            sinks,
            timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Returns how many sinks accepted the notification.
    pub async fn deliver(&self, notification: Notification) -> usize {
        let notification = Arc::new(notification);
        let timeout = self.timeout;

        let tasks = self.sinks.iter().cloned().map(|sink| {
            let notification = notification.clone();
            tokio::spawn(async move {
                let name = sink.name().to_string();
                match tokio::time::timeout(timeout, sink.deliver(&notification)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(sink = %name, kind = %notification.kind, error = %e, "notification sink failed");
                        false
                    }
                    Err(_) => {
                        warn!(sink = %name, kind = %notification.kind, timeout = ?timeout, "notification sink timed out");
                        false
                    }
                }
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .filter(|joined| match joined {
                Ok(delivered) => *delivered,
                Err(e) => {
                    warn!(error = %e, "notification sink task panicked");
                    false
                }
            })
            .count()
    }
}

#[async_trait]
impl EventHandler<PipelineEvent> for NotificationFanout {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, envelope: &EventEnvelope<PipelineEvent>) -> Result<()> {
        if self.sinks.is_empty() {
            return Ok(());
        }
        let notification = Notification::from_envelope(envelope);
        let kind = notification.kind.clone();
        let delivered = self.deliver(notification).await;
        debug!(%kind, delivered, sinks = self.sinks.len(), "notification fanned out");
        Ok(())
    }
}

//! Collaborators the pipeline is built from (trait objects for testability)

use std::sync::Arc;

use crate::kernel::{
    stream_hub::StreamHub, BaseContentScorer, BaseDeviceRegistry, BaseNotificationSink,
};

/// External capabilities handed to the pipeline. The hub is always wired
/// as a sink; `sinks` adds further observers.
#[derive(Clone)]
pub struct PipelineDeps {
    pub scorer: Arc<dyn BaseContentScorer>,
    pub devices: Arc<dyn BaseDeviceRegistry>,
    /// In-process pub/sub hub for live streaming to SSE endpoints
    pub stream_hub: StreamHub,
    pub sinks: Vec<Arc<dyn BaseNotificationSink>>,
}

impl PipelineDeps {
    pub fn new(
        scorer: Arc<dyn BaseContentScorer>,
        devices: Arc<dyn BaseDeviceRegistry>,
        stream_hub: StreamHub,
    ) -> Self {
        Self {
            scorer,
            devices,
            stream_hub,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn BaseNotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

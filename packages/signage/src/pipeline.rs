//! Pipeline assembly.
//!
//! ```ignore
//! let pipeline = Pipeline::builder(config, deps).build();
//! let handle = pipeline.start();
//!
//! handle.context().content.ingest(upload)?;
//! // ... moderation and distribution run in the background
//!
//! handle.shutdown().await;
//! ```
//!
//! Every bus subscriber is registered in `build()`, before anything can
//! publish, so no early event is missed. `start()` spawns the workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::domains::content::{ContentStore, UploadReaper};
use crate::domains::distribution::{ApprovalSweeper, AutoDistributor, DistributionEngine};
use crate::domains::moderation::{ModerationOrchestrator, ReviewDesk};
use crate::domains::notifications::effects::fanout::DEFAULT_SINK_TIMEOUT;
use crate::domains::notifications::{NotificationFanout, StreamHubSink};
use crate::events::PipelineBus;
use crate::kernel::event_bus::EventBus;
use crate::kernel::worker::{KeyedWorkerPool, Service};
use crate::kernel::{BaseDeviceRegistry, BaseNotificationSink, PipelineDeps, StreamHub};

/// Everything callers (HTTP routes, tests) use to drive the pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub bus: PipelineBus,
    pub content: Arc<ContentStore>,
    pub review: ReviewDesk,
    pub distribution: Arc<DistributionEngine>,
    pub devices: Arc<dyn BaseDeviceRegistry>,
    pub stream_hub: StreamHub,
}

pub struct PipelineBuilder {
    config: Config,
    deps: PipelineDeps,
    sink_timeout: Duration,
}

impl PipelineBuilder {
    pub fn new(config: Config, deps: PipelineDeps) -> Self {
        Self {
            config,
            deps,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn build(self) -> Pipeline {
        let PipelineBuilder {
            config,
            deps,
            sink_timeout,
        } = self;
        let shutdown = CancellationToken::new();
        let bus: PipelineBus =
            EventBus::with_capacity(config.event_bus_capacity, config.event_bus_overflow);

        // Subscribe first: nothing below may publish before these exist.
        let moderation_events = bus.subscribe("moderation");
        let notification_events = bus.subscribe("notifications");
        let approval_events = config
            .auto_distribute_on_approval
            .then(|| bus.subscribe("auto-distribution"));

        let content = Arc::new(ContentStore::new(bus.clone(), config.max_upload_bytes));
        let review = ReviewDesk::new(content.clone(), bus.clone());
        let distribution = Arc::new(DistributionEngine::new(
            content.clone(),
            deps.devices.clone(),
            bus.clone(),
        ));

        let mut services: Vec<Box<dyn Service>> = Vec::new();

        let orchestrator = ModerationOrchestrator::new(
            content.clone(),
            deps.scorer.clone(),
            bus.clone(),
            config.thresholds,
            config.scoring,
            shutdown.clone(),
        );
        services.push(Box::new(KeyedWorkerPool::new(
            moderation_events,
            Arc::new(orchestrator),
            config.worker_lanes,
        )));

        if let Some(approval_events) = approval_events {
            let distributor = Arc::new(AutoDistributor::new(
                distribution.clone(),
                deps.devices.clone(),
                config.default_distribution_priority,
            ));
            services.push(Box::new(KeyedWorkerPool::new(
                approval_events,
                distributor.clone(),
                config.worker_lanes,
            )));
            services.push(Box::new(ApprovalSweeper::new(
                distributor,
                content.clone(),
                config.upload_reaper_interval,
                config.upload_reaper_grace,
            )));
        }

        // One lane: observers see events in publish order.
        let mut sinks: Vec<Arc<dyn BaseNotificationSink>> =
            vec![Arc::new(StreamHubSink::new(deps.stream_hub.clone()))];
        sinks.extend(deps.sinks.iter().cloned());
        let fanout = NotificationFanout::new(sinks).with_timeout(sink_timeout);
        services.push(Box::new(KeyedWorkerPool::new(
            notification_events,
            Arc::new(fanout),
            1,
        )));

        services.push(Box::new(
            UploadReaper::new(
                content.clone(),
                bus.clone(),
                config.upload_reaper_interval,
                config.upload_reaper_grace,
            )
            .with_quarantine_backstop(config.scoring.budget()),
        ));

        Pipeline {
            context: PipelineContext {
                bus,
                content,
                review,
                distribution,
                devices: deps.devices,
                stream_hub: deps.stream_hub,
            },
            services,
            shutdown,
        }
    }
}

/// A wired pipeline whose background services have not started yet.
pub struct Pipeline {
    context: PipelineContext,
    services: Vec<Box<dyn Service>>,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn builder(config: Config, deps: PipelineDeps) -> PipelineBuilder {
        PipelineBuilder::new(config, deps)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Spawn every background service on the current runtime.
    pub fn start(self) -> PipelineHandle {
        let tasks = self
            .services
            .into_iter()
            .map(|service| {
                let shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    let name = service.name();
                    if let Err(e) = service.run(shutdown).await {
                        error!(service = name, error = %e, "service stopped with error");
                    }
                })
            })
            .collect::<Vec<_>>();

        info!(services = tasks.len(), "pipeline started");
        PipelineHandle {
            context: self.context,
            shutdown: self.shutdown,
            tasks,
        }
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    context: PipelineContext,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Token that stops every service when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the services and wait for their in-flight work to drain.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "service task panicked");
            }
        }
        self.context.bus.close();
        info!("pipeline stopped");
    }
}

//! Test harness running a full in-process pipeline against test doubles.
//!
//! The scorer answers by storage locator (see `fixtures`), so each test
//! picks an outcome by choosing which locator it uploads with.

use std::sync::Arc;
use std::time::{Duration, Instant};

use signage_core::common::{ContentId, DeviceId};
use signage_core::domains::content::models::{ContentItem, ContentStatus};
use signage_core::domains::moderation::ScoringRetryPolicy;
use signage_core::kernel::test_dependencies::{
    MockDeviceRegistry, MockScore, MockScorer, RecordingSink,
};
use signage_core::kernel::{PipelineDeps, StreamHub};
use signage_core::{Config, Pipeline, PipelineContext, PipelineHandle};
use test_context::AsyncTestContext;

use super::fixtures::{
    APPROVE_LOCATOR, HANG_LOCATOR, PANIC_LOCATOR, REJECT_LOCATOR, REVIEW_LOCATOR,
    UNAVAILABLE_LOCATOR,
};

/// How long `eventually` waits before failing the test.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Test harness owning a started pipeline.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let id = upload(ctx, APPROVE_LOCATOR);
///     ctx.wait_for_status(id, ContentStatus::Approved).await;
/// }
/// ```
pub struct TestHarness {
    pub scorer: Arc<MockScorer>,
    pub devices: Arc<MockDeviceRegistry>,
    pub sink: Arc<RecordingSink>,
    /// Eligible, listed as active.
    pub d1: DeviceId,
    /// Eligible, listed as active.
    pub d2: DeviceId,
    /// Never registered, so never eligible.
    pub unknown_device: DeviceId,
    context: PipelineContext,
    handle: Option<PipelineHandle>,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
    }

    async fn teardown(self) {
        self.shutdown().await;
    }
}

impl TestHarness {
    /// Short timeouts and backoff so failure paths finish quickly; the
    /// upload reaper is effectively off.
    pub fn test_config() -> Config {
        Config::default()
            .with_scoring(ScoringRetryPolicy {
                timeout: Duration::from_millis(50),
                max_retries: 2,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            })
            .with_worker_lanes(4)
            .with_upload_reaper(Duration::from_secs(3600), Duration::from_secs(3600))
    }

    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let (mut harness, pipeline) = Self::unstarted(config);
        harness.start(pipeline);
        harness
    }

    /// Wire the pipeline without starting its workers; events pile up in
    /// the subscriber buffers until `start` is called.
    pub fn unstarted(config: Config) -> (Self, Pipeline) {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let d1 = DeviceId::new();
        let d2 = DeviceId::new();

        let scorer = Arc::new(
            MockScorer::new()
                .with_locator(APPROVE_LOCATOR, MockScore::Confidence(0.98))
                .with_locator(REVIEW_LOCATOR, MockScore::Confidence(0.5))
                .with_locator(REJECT_LOCATOR, MockScore::Confidence(0.1))
                .with_locator(UNAVAILABLE_LOCATOR, MockScore::Fail("model offline".into()))
                .with_locator(HANG_LOCATOR, MockScore::Hang)
                .with_locator(PANIC_LOCATOR, MockScore::Panic("model runtime crashed".into())),
        );
        let devices = Arc::new(
            MockDeviceRegistry::new()
                .with_active_device(d1)
                .with_active_device(d2),
        );
        let sink = Arc::new(RecordingSink::new("recorder"));

        let deps = PipelineDeps::new(scorer.clone(), devices.clone(), StreamHub::new())
            .with_sink(sink.clone());
        let pipeline = Pipeline::builder(config, deps)
            .with_sink_timeout(Duration::from_millis(200))
            .build();

        let harness = Self {
            scorer,
            devices,
            sink,
            d1,
            d2,
            unknown_device: DeviceId::new(),
            context: pipeline.context().clone(),
            handle: None,
        };
        (harness, pipeline)
    }

    pub fn start(&mut self, pipeline: Pipeline) {
        self.handle = Some(pipeline.start());
    }

    pub fn ctx(&self) -> &PipelineContext {
        &self.context
    }

    pub fn item(&self, id: ContentId) -> ContentItem {
        self.context
            .content
            .get(id)
            .unwrap_or_else(|| panic!("content {} not found", id))
    }

    /// Poll until `check` passes.
    pub async fn eventually(&self, what: &str, check: impl Fn() -> bool) {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        while Instant::now() < deadline {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    pub async fn wait_for_status(&self, id: ContentId, status: ContentStatus) -> ContentItem {
        self.eventually(&format!("{} to reach {}", id, status), || {
            self.context.content.status(id) == Some(status)
        })
        .await;
        self.item(id)
    }

    /// Wait until the notification sink has seen `count` events of `kind`.
    pub async fn wait_for_notifications(&self, kind: &str, count: usize) {
        self.eventually(&format!("{} x{}", kind, count), || {
            self.sink.count_of(kind) >= count
        })
        .await;
    }

    /// Give in-flight handlers a moment to (not) do anything further.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }
}

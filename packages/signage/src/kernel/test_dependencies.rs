// TestDependencies - mock implementations for testing
//
// Scripted stand-ins for the scorer, device registry and notification sinks,
// each recording how it was called.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{
    BaseContentScorer, BaseDeviceRegistry, BaseNotificationSink, ContentScore, ModerationAnalysis,
    ScoreRequest,
};
use crate::common::{ContentId, DeviceId};
use crate::domains::notifications::Notification;

// =============================================================================
// Mock Scorer
// =============================================================================

#[derive(Debug, Clone)]
pub enum MockScore {
    Confidence(f64),
    Fail(String),
    /// Never returns; exercises the caller's timeout.
    Hang,
    /// Panics inside the scorer call.
    Panic(String),
}

/// Answers, in priority order: a per-locator script, the FIFO script, then
/// the fallback. With none of those it fails.
pub struct MockScorer {
    script: Arc<Mutex<VecDeque<MockScore>>>,
    by_locator: Arc<Mutex<HashMap<String, MockScore>>>,
    fallback: Arc<Mutex<Option<MockScore>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<ContentId>>>,
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            by_locator: Arc::new(Mutex::new(HashMap::new())),
            fallback: Arc::new(Mutex::new(None)),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful score.
    pub fn with_confidence(self, confidence: f64) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(MockScore::Confidence(confidence));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(MockScore::Fail(message.to_string()));
        self
    }

    /// Answer for one storage locator regardless of call order.
    pub fn with_locator(self, locator: &str, score: MockScore) -> Self {
        self.by_locator
            .lock()
            .unwrap()
            .insert(locator.to_string(), score);
        self
    }

    /// Answer used once the script is exhausted.
    pub fn with_fallback(self, score: MockScore) -> Self {
        *self.fallback.lock().unwrap() = Some(score);
        self
    }

    pub fn always_fail(self, message: &str) -> Self {
        self.with_fallback(MockScore::Fail(message.to_string()))
    }

    pub fn always_hang(self) -> Self {
        self.with_fallback(MockScore::Hang)
    }

    /// Latency added to every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ContentId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, id: ContentId) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == id).count()
    }

    fn next_answer(&self, locator: &str) -> Option<MockScore> {
        if let Some(score) = self.by_locator.lock().unwrap().get(locator) {
            return Some(score.clone());
        }
        if let Some(score) = self.script.lock().unwrap().pop_front() {
            return Some(score);
        }
        self.fallback.lock().unwrap().clone()
    }
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseContentScorer for MockScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<ContentScore> {
        self.calls.lock().unwrap().push(request.content_id);
        let answer = self.next_answer(&request.storage_locator);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match answer {
            Some(MockScore::Confidence(confidence)) => Ok(ContentScore {
                confidence,
                analysis: ModerationAnalysis {
                    reasoning: format!("mock score {}", confidence),
                    categories: vec!["test".to_string()],
                    ..Default::default()
                },
            }),
            Some(MockScore::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(MockScore::Panic(message)) => panic!("{}", message),
            Some(MockScore::Hang) => {
                std::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
            None => Err(anyhow::anyhow!("MockScorer has no scripted response")),
        }
    }
}

// =============================================================================
// Mock Device Registry
// =============================================================================

pub struct MockDeviceRegistry {
    eligible: Arc<Mutex<HashSet<DeviceId>>>,
    active: Arc<Mutex<Vec<DeviceId>>>,
    unreachable: Arc<Mutex<HashSet<DeviceId>>>,
    offline: Arc<Mutex<bool>>,
    eligibility_checks: Arc<Mutex<Vec<DeviceId>>>,
    delay: Duration,
}

impl MockDeviceRegistry {
    pub fn new() -> Self {
        Self {
            eligible: Arc::new(Mutex::new(HashSet::new())),
            active: Arc::new(Mutex::new(Vec::new())),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
            offline: Arc::new(Mutex::new(false)),
            eligibility_checks: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    /// Latency added to every eligibility lookup.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Eligible and listed as active.
    pub fn with_active_device(self, id: DeviceId) -> Self {
        self.eligible.lock().unwrap().insert(id);
        self.active.lock().unwrap().push(id);
        self
    }

    /// Eligible but not listed as active.
    pub fn with_eligible_device(self, id: DeviceId) -> Self {
        self.eligible.lock().unwrap().insert(id);
        self
    }

    /// Eligibility lookups for this device fail.
    pub fn with_unreachable_device(self, id: DeviceId) -> Self {
        self.unreachable.lock().unwrap().insert(id);
        self
    }

    /// Every call fails.
    pub fn offline(self) -> Self {
        *self.offline.lock().unwrap() = true;
        self
    }

    pub fn eligibility_checks(&self) -> Vec<DeviceId> {
        self.eligibility_checks.lock().unwrap().clone()
    }
}

impl Default for MockDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDeviceRegistry for MockDeviceRegistry {
    async fn is_eligible(&self, device_id: DeviceId) -> Result<bool> {
        self.eligibility_checks.lock().unwrap().push(device_id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if *self.offline.lock().unwrap() || self.unreachable.lock().unwrap().contains(&device_id) {
            anyhow::bail!("device registry unreachable");
        }
        Ok(self.eligible.lock().unwrap().contains(&device_id))
    }

    async fn list_active_devices(&self) -> Result<Vec<DeviceId>> {
        if *self.offline.lock().unwrap() {
            anyhow::bail!("device registry unreachable");
        }
        Ok(self.active.lock().unwrap().clone())
    }
}

// =============================================================================
// Notification Sinks
// =============================================================================

/// Keeps every notification it receives.
pub struct RecordingSink {
    name: String,
    received: Arc<Mutex<Vec<Notification>>>,
    delay: Duration,
}

impl RecordingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            received: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_types(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.kind.clone())
            .collect()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

#[async_trait]
impl BaseNotificationSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Fails every delivery and counts the attempts.
pub struct FailingSink {
    attempts: Arc<Mutex<usize>>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(Mutex::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl Default for FailingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseNotificationSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _notification: &Notification) -> Result<()> {
        *self.attempts.lock().unwrap() += 1;
        anyhow::bail!("sink is down")
    }
}

// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Moderation policy, distribution rules etc. live in the domains and call these.
//
// Naming convention: Base* for trait names (e.g., BaseContentScorer)

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{ContentId, DeviceId};
use crate::domains::notifications::Notification;

// =============================================================================
// Content Scorer Trait (Infrastructure - AI moderation backend)
// =============================================================================

/// What the scorer gets to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub content_id: ContentId,
    pub media_type: String,
    pub storage_locator: String,
}

/// Structured reasoning returned alongside a confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModerationAnalysis {
    pub reasoning: String,
    pub categories: Vec<String>,
    pub concerns: Vec<String>,
    pub suggestions: Vec<String>,
    /// Per-category safety scores in [0, 1], higher is safer.
    pub safety_scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentScore {
    /// Confidence that the content is safe to show, in [0, 1].
    pub confidence: f64,
    pub analysis: ModerationAnalysis,
}

#[async_trait]
pub trait BaseContentScorer: Send + Sync {
    /// Score one content item. May be slow, may fail; callers bound it.
    async fn score(&self, request: &ScoreRequest) -> Result<ContentScore>;
}

// =============================================================================
// Device Registry Trait (Infrastructure - fleet inventory)
// =============================================================================

#[async_trait]
pub trait BaseDeviceRegistry: Send + Sync {
    /// Whether the device may be targeted for distribution right now.
    async fn is_eligible(&self, device_id: DeviceId) -> Result<bool>;

    /// Devices currently online and accepting content.
    async fn list_active_devices(&self) -> Result<Vec<DeviceId>>;
}

// =============================================================================
// Notification Sink Trait (Infrastructure - dashboards, webhooks, sockets)
// =============================================================================

#[async_trait]
pub trait BaseNotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Best-effort delivery. Errors are logged by the caller, never retried.
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

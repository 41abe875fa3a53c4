use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ContentId, DeliveryId, DeviceId};

/// Delivery of one approved item to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub id: DeliveryId,
    pub content_id: ContentId,
    pub device_id: DeviceId,
    pub status: DeliveryStatus,
    /// Higher goes first when a device pulls work.
    pub priority: i32,

    // Transition timestamps
    pub queued_at: DateTime<Utc>,
    pub downloading_at: Option<DateTime<Utc>>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub displayed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub failure_reason: Option<String>,
    /// Last free-form detail reported by the device.
    pub detail: Option<String>,

    // Retry / supersede chain
    pub supersedes: Option<DeliveryId>,
    pub superseded_by: Option<DeliveryId>,
}

impl DistributionRecord {
    pub fn queued(
        content_id: ContentId,
        device_id: DeviceId,
        priority: i32,
        supersedes: Option<DeliveryId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeliveryId::new(),
            content_id,
            device_id,
            status: DeliveryStatus::Queued,
            priority,
            queued_at: now,
            downloading_at: None,
            downloaded_at: None,
            displayed_at: None,
            failed_at: None,
            updated_at: now,
            failure_reason: None,
            detail: None,
            supersedes,
            superseded_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Stamp a validated status change onto the record.
    pub(crate) fn apply(&mut self, status: DeliveryStatus, detail: Option<String>, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        match status {
            DeliveryStatus::Queued => {}
            DeliveryStatus::Downloading => self.downloading_at = Some(at),
            DeliveryStatus::Downloaded => self.downloaded_at = Some(at),
            DeliveryStatus::Displayed => self.displayed_at = Some(at),
            DeliveryStatus::Failed => {
                self.failed_at = Some(at);
                self.failure_reason = Some(
                    detail
                        .clone()
                        .unwrap_or_else(|| "device reported failure".to_string()),
                );
            }
        }
        if detail.is_some() {
            self.detail = detail;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Downloading,
    Downloaded,
    Displayed,
    Failed,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Queued,
        DeliveryStatus::Downloading,
        DeliveryStatus::Downloaded,
        DeliveryStatus::Displayed,
        DeliveryStatus::Failed,
    ];

    pub fn index(self) -> usize {
        match self {
            DeliveryStatus::Queued => 0,
            DeliveryStatus::Downloading => 1,
            DeliveryStatus::Downloaded => 2,
            DeliveryStatus::Displayed => 3,
            DeliveryStatus::Failed => 4,
        }
    }

    /// Position on the forward path. `Failed` sits off it.
    pub fn progress(self) -> Option<u8> {
        match self {
            DeliveryStatus::Queued => Some(0),
            DeliveryStatus::Downloading => Some(1),
            DeliveryStatus::Downloaded => Some(2),
            DeliveryStatus::Displayed => Some(3),
            DeliveryStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Displayed | DeliveryStatus::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Downloading => write!(f, "downloading"),
            DeliveryStatus::Downloaded => write!(f, "downloaded"),
            DeliveryStatus::Displayed => write!(f, "displayed"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "queued" => Ok(DeliveryStatus::Queued),
            "downloading" => Ok(DeliveryStatus::Downloading),
            "downloaded" => Ok(DeliveryStatus::Downloaded),
            "displayed" => Ok(DeliveryStatus::Displayed),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid delivery status: {}", s)),
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::DeliveryStatus;
use crate::domains::content::models::ContentStatusCounts;

/// Fleet-wide aggregate view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub total_distributions: u64,
    pub queued: u64,
    pub downloading: u64,
    pub downloaded: u64,
    pub displayed: u64,
    pub failed: u64,
    /// Distinct devices ever targeted.
    pub total_devices: u64,
    /// Devices with at least one non-terminal record.
    pub active_devices: u64,
    /// displayed / (displayed + failed), 0.0 before anything finishes.
    pub success_rate: f64,
    pub content: ContentStatusCounts,
}

impl DistributionStats {
    pub fn from_counts(
        counts: [u64; 5],
        total_devices: u64,
        active_devices: u64,
        content: ContentStatusCounts,
    ) -> Self {
        let [queued, downloading, downloaded, displayed, failed] = counts;
        let finished = displayed + failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            displayed as f64 / finished as f64
        };

        Self {
            total_distributions: counts.iter().sum(),
            queued,
            downloading,
            downloaded,
            displayed,
            failed,
            total_devices,
            active_devices,
            success_rate,
            content,
        }
    }

    pub fn count(&self, status: DeliveryStatus) -> u64 {
        match status {
            DeliveryStatus::Queued => self.queued,
            DeliveryStatus::Downloading => self.downloading,
            DeliveryStatus::Downloaded => self.downloaded,
            DeliveryStatus::Displayed => self.displayed,
            DeliveryStatus::Failed => self.failed,
        }
    }
}

/// Per-status record counters, moved atomically with each transition.
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    counts: [AtomicU64; 5],
}

impl DeliveryCounters {
    pub fn record_created(&self) {
        self.counts[DeliveryStatus::Queued.index()].fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_moved(&self, from: DeliveryStatus, to: DeliveryStatus) {
        // Increment first so a concurrent snapshot never sees the record vanish.
        self.counts[to.index()].fetch_add(1, Ordering::AcqRel);
        self.counts[from.index()].fetch_sub(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> [u64; 5] {
        let mut out = [0; 5];
        for (slot, counter) in out.iter_mut().zip(self.counts.iter()) {
            *slot = counter.load(Ordering::Acquire);
        }
        out
    }
}

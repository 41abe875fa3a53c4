use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::common::DeviceId;
use crate::domains::moderation::{ScoringRetryPolicy, Thresholds};
use crate::kernel::event_bus::{OverflowPolicy, DEFAULT_CAPACITY};

const MIB: u64 = 1024 * 1024;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    // Moderation
    pub thresholds: Thresholds,
    pub scoring: ScoringRetryPolicy,
    pub simulated_approval_rate: f64,
    pub simulated_scorer_latency: Duration,

    // Event bus
    pub event_bus_capacity: usize,
    pub event_bus_overflow: OverflowPolicy,
    pub worker_lanes: usize,

    // Ingestion
    pub max_upload_bytes: u64,

    // Distribution
    pub auto_distribute_on_approval: bool,
    pub default_distribution_priority: i32,
    /// Seeded as active in the in-memory device registry.
    pub devices: Vec<DeviceId>,

    // Recovery
    pub upload_reaper_interval: Duration,
    pub upload_reaper_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            thresholds: Thresholds::default(),
            scoring: ScoringRetryPolicy::default(),
            simulated_approval_rate: 0.7,
            simulated_scorer_latency: Duration::ZERO,
            event_bus_capacity: DEFAULT_CAPACITY,
            event_bus_overflow: OverflowPolicy::default(),
            worker_lanes: 8,
            max_upload_bytes: 500 * MIB,
            auto_distribute_on_approval: false,
            default_distribution_priority: 0,
            devices: Vec::new(),
            upload_reaper_interval: Duration::from_secs(30),
            upload_reaper_grace: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let parse = |key: &'static str| Setting { key, raw: lookup(key) };

        let thresholds = Thresholds::new(
            parse("AUTO_APPROVE_THRESHOLD").or(defaults.thresholds.auto_approve)?,
            parse("AUTO_REJECT_THRESHOLD").or(defaults.thresholds.auto_reject)?,
        )
        .context("AUTO_APPROVE_THRESHOLD / AUTO_REJECT_THRESHOLD are inconsistent")?;

        let scoring = ScoringRetryPolicy {
            timeout: parse("SCORER_TIMEOUT_MS").millis_or(defaults.scoring.timeout)?,
            max_retries: parse("SCORER_MAX_RETRIES").or(defaults.scoring.max_retries)?,
            initial_backoff: parse("SCORER_INITIAL_BACKOFF_MS")
                .millis_or(defaults.scoring.initial_backoff)?,
            max_backoff: parse("SCORER_MAX_BACKOFF_MS").millis_or(defaults.scoring.max_backoff)?,
        };

        let simulated_approval_rate: f64 =
            parse("SIMULATED_APPROVAL_RATE").or(defaults.simulated_approval_rate)?;
        if !(0.0..=1.0).contains(&simulated_approval_rate) {
            anyhow::bail!("SIMULATED_APPROVAL_RATE must be within [0, 1]");
        }

        let event_bus_capacity: usize =
            parse("EVENT_BUS_CAPACITY").or(defaults.event_bus_capacity)?;
        if event_bus_capacity == 0 {
            anyhow::bail!("EVENT_BUS_CAPACITY must be at least 1");
        }
        let worker_lanes: usize = parse("PIPELINE_WORKER_LANES").or(defaults.worker_lanes)?;
        if worker_lanes == 0 {
            anyhow::bail!("PIPELINE_WORKER_LANES must be at least 1");
        }

        let devices = match lookup("SIGNAGE_DEVICES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    DeviceId::parse(s)
                        .with_context(|| format!("SIGNAGE_DEVICES has an invalid device id: {}", s))
                })
                .collect::<Result<Vec<_>>>()?,
            None => defaults.devices,
        };

        Ok(Self {
            port: parse("PORT").or(defaults.port)?,
            thresholds,
            scoring,
            simulated_approval_rate,
            simulated_scorer_latency: parse("SIMULATED_SCORER_LATENCY_MS")
                .millis_or(defaults.simulated_scorer_latency)?,
            event_bus_capacity,
            event_bus_overflow: parse("EVENT_BUS_OVERFLOW").or(defaults.event_bus_overflow)?,
            worker_lanes,
            max_upload_bytes: parse("MAX_UPLOAD_BYTES").or(defaults.max_upload_bytes)?,
            auto_distribute_on_approval: parse("AUTO_DISTRIBUTE_ON_APPROVAL")
                .or(defaults.auto_distribute_on_approval)?,
            default_distribution_priority: parse("DEFAULT_DISTRIBUTION_PRIORITY")
                .or(defaults.default_distribution_priority)?,
            devices,
            upload_reaper_interval: parse("UPLOAD_REAPER_INTERVAL_SECS")
                .secs_or(defaults.upload_reaper_interval)?,
            upload_reaper_grace: parse("UPLOAD_REAPER_GRACE_SECS")
                .secs_or(defaults.upload_reaper_grace)?,
        })
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringRetryPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_event_bus(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.event_bus_capacity = capacity.max(1);
        self.event_bus_overflow = overflow;
        self
    }

    pub fn with_worker_lanes(mut self, lanes: usize) -> Self {
        self.worker_lanes = lanes.max(1);
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_auto_distribution(mut self, enabled: bool, priority: i32) -> Self {
        self.auto_distribute_on_approval = enabled;
        self.default_distribution_priority = priority;
        self
    }

    pub fn with_devices(mut self, devices: Vec<DeviceId>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_upload_reaper(mut self, interval: Duration, grace: Duration) -> Self {
        self.upload_reaper_interval = interval;
        self.upload_reaper_grace = grace;
        self
    }
}

struct Setting {
    key: &'static str,
    raw: Option<String>,
}

impl Setting {
    fn or<T>(self, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("{} has an invalid value: {}", self.key, raw)),
        }
    }

    fn millis_or(self, default: Duration) -> Result<Duration> {
        let millis: u64 = self.or(default.as_millis() as u64)?;
        Ok(Duration::from_millis(millis))
    }

    fn secs_or(self, default: Duration) -> Result<Duration> {
        let secs: u64 = self.or(default.as_secs())?;
        Ok(Duration::from_secs(secs))
    }
}

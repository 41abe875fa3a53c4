//! In-memory device registry.
//!
//! Stands in for the fleet inventory service. Devices that are `active` or
//! temporarily `offline` can be targeted (offline screens pick deliveries up
//! when they reconnect). Devices in maintenance or decommissioned cannot.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::BaseDeviceRegistry;
use crate::common::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Active,
    Offline,
    Maintenance,
    Decommissioned,
}

impl DeviceState {
    pub fn is_eligible(self) -> bool {
        matches!(self, DeviceState::Active | DeviceState::Offline)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Active => "active",
            DeviceState::Offline => "offline",
            DeviceState::Maintenance => "maintenance",
            DeviceState::Decommissioned => "decommissioned",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DeviceState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DeviceState::Active),
            "offline" => Ok(DeviceState::Offline),
            "maintenance" => Ok(DeviceState::Maintenance),
            "decommissioned" => Ok(DeviceState::Decommissioned),
            _ => Err(anyhow::anyhow!("Invalid device state: {}", s)),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: DashMap<DeviceId, DeviceState>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with active devices.
    pub fn with_active(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        let registry = Self::new();
        for id in devices {
            registry.register(id, DeviceState::Active);
        }
        registry
    }

    /// Add a device or overwrite its state.
    pub fn register(&self, id: DeviceId, state: DeviceState) {
        self.devices.insert(id, state);
    }

    pub fn state(&self, id: DeviceId) -> Option<DeviceState> {
        self.devices.get(&id).map(|s| *s)
    }

    pub fn remove(&self, id: DeviceId) -> Option<DeviceState> {
        self.devices.remove(&id).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl BaseDeviceRegistry for InMemoryDeviceRegistry {
    async fn is_eligible(&self, device_id: DeviceId) -> Result<bool> {
        Ok(self
            .state(device_id)
            .map(DeviceState::is_eligible)
            .unwrap_or(false))
    }

    async fn list_active_devices(&self) -> Result<Vec<DeviceId>> {
        let mut active: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|entry| *entry.value() == DeviceState::Active)
            .map(|entry| *entry.key())
            .collect();
        active.sort();
        Ok(active)
    }
}

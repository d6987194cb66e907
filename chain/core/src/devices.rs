//! Known-Devices Registry
//!
//! Single source of truth for the devices currently known on this
//! connection, keyed by daemon id.

use std::collections::HashMap;

use crate::model::Device;
use crate::protocol::DeviceId;

/// Devices registered on the current connection
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
}

impl DeviceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// No device registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look up a device
    #[must_use]
    pub fn get(&self, device_id: DeviceId) -> Option<&Device> {
        self.devices.get(&device_id)
    }

    /// Whether `device_id` is registered
    #[must_use]
    pub fn contains(&self, device_id: DeviceId) -> bool {
        self.devices.contains_key(&device_id)
    }

    /// All registered devices, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Index the next device announced with `uri` would receive
    ///
    /// Counts registered devices with the same URI. Indices already handed
    /// out are never revisited.
    #[must_use]
    pub fn next_unique_index(&self, uri: &str) -> usize {
        self.devices.values().filter(|d| d.uri == uri).count()
    }

    /// Register a device, replacing any record with the same id
    pub fn insert(&mut self, device: Device) -> Option<Device> {
        self.devices.insert(device.device_id, device)
    }

    /// Forget a device; unknown ids are ignored
    pub fn remove(&mut self, device_id: DeviceId) -> Option<Device> {
        self.devices.remove(&device_id)
    }

    /// Forget every device
    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

//! Observer that writes hardware changes to the log

use std::collections::HashMap;

use chain_core::{ActuatorMetadata, DeviceId, HardwareObserver};
use tracing::info;

/// Logs every notification and keeps a tally per device
#[derive(Debug, Default)]
pub struct LoggingObserver {
    devices_added: usize,
    actuators: HashMap<DeviceId, usize>,
}

impl LoggingObserver {
    /// Devices announced so far
    pub fn devices_added(&self) -> usize {
        self.devices_added
    }

    /// Actuators currently known across all devices
    pub fn total_actuators(&self) -> usize {
        self.actuators.values().sum()
    }

    #[cfg(test)]
    fn actuator_count(&self, device_id: DeviceId) -> usize {
        self.actuators.get(&device_id).copied().unwrap_or(0)
    }
}

// The listener owns the observer until its task ends
impl Drop for LoggingObserver {
    fn drop(&mut self) {
        info!(
            devices_added = self.devices_added(),
            actuators = self.total_actuators(),
            "Hardware summary"
        );
    }
}

impl HardwareObserver for LoggingObserver {
    fn hardware_added(&mut self, uri: &str, label: &str, version: &str) {
        self.devices_added += 1;
        info!(uri, label, version, "Hardware added");
    }

    fn actuator_added(&mut self, device_id: DeviceId, actuator_id: u32, metadata: &ActuatorMetadata) {
        *self.actuators.entry(device_id).or_default() += 1;
        let metadata = serde_json::to_string(metadata).unwrap_or_default();
        info!(device_id = %device_id, actuator_id, %metadata, "Actuator added");
    }

    fn actuator_removed(&mut self, device_id: DeviceId) {
        let actuators = self.actuators.remove(&device_id).unwrap_or(0);
        info!(device_id = %device_id, actuators, "Actuators removed");
    }
}

//! Descriptor Ingestion
//!
//! Turns a `device_descriptor` reply into a registered [`Device`] and
//! notifies the host:
//!
//! 1. Reject the device if its URI contains whitespace
//! 2. Compute its unique index among devices sharing the URI
//! 3. `hardware_added`, then register the device
//! 4. `actuator_added` for every actuator with at least one known mode
//!
//! Removals go through the same component so that the host is told before
//! the registry forgets the device.

use crate::devices::DeviceRegistry;
use crate::model::{is_valid_uri, ActuatorMetadata, Device};
use crate::observer::HardwareObserver;
use crate::protocol::{DeviceDescriptor, DeviceId};

/// What happened to one descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Device registered and announced
    Registered {
        /// Unique index assigned to the device
        unique_index: usize,
        /// Actuators announced to the host
        announced: usize,
        /// Actuators dropped for lack of a known mode
        skipped: usize,
    },
    /// Device rejected; nothing was announced
    Rejected,
}

/// Owns the known-devices map and feeds it from descriptors
#[derive(Debug, Default)]
pub struct DescriptorIngestor {
    registry: DeviceRegistry,
}

impl DescriptorIngestor {
    /// Create an ingestor with no known devices
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices known so far
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Register `descriptor` as `device_id` and notify `observer`
    pub fn ingest<O: HardwareObserver + ?Sized>(
        &mut self,
        observer: &mut O,
        device_id: DeviceId,
        descriptor: &DeviceDescriptor,
    ) -> IngestOutcome {
        if !is_valid_uri(&descriptor.uri) {
            tracing::warn!(
                device_id = %device_id,
                uri = %descriptor.uri,
                "Device URI is invalid, ignoring device"
            );
            return IngestOutcome::Rejected;
        }

        let unique_index = self.registry.next_unique_index(&descriptor.uri);
        let device = Device::from_descriptor(device_id, descriptor, unique_index);
        let skipped = descriptor.actuators.len() - device.actuators.len();

        observer.hardware_added(&device.uri, &device.symbol(), &device.version);

        let announcements: Vec<(u32, ActuatorMetadata)> = device
            .actuators
            .iter()
            .map(|a| (a.id, a.metadata()))
            .collect();

        tracing::info!(
            device_id = %device_id,
            uri = %device.uri,
            unique_index,
            actuators = announcements.len(),
            skipped,
            "Device registered"
        );

        if self.registry.insert(device).is_some() {
            tracing::debug!(device_id = %device_id, "Replaced existing device record");
        }

        for (actuator_id, metadata) in &announcements {
            observer.actuator_added(device_id, *actuator_id, metadata);
        }

        IngestOutcome::Registered {
            unique_index,
            announced: announcements.len(),
            skipped,
        }
    }

    /// Tell `observer` the device is gone, then forget it
    ///
    /// The observer is notified even for ids that were never registered.
    pub fn remove<O: HardwareObserver + ?Sized>(&mut self, observer: &mut O, device_id: DeviceId) {
        observer.actuator_removed(device_id);
        match self.registry.remove(device_id) {
            Some(device) => tracing::info!(device_id = %device_id, uri = %device.uri, "Device removed"),
            None => tracing::debug!(device_id = %device_id, "Removed device was not registered"),
        }
    }

    /// Forget every device without notifying anyone
    ///
    /// Device ids are only valid for one connection.
    pub fn reset(&mut self) {
        self.registry.clear();
    }
}

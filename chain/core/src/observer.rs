//! Host Notification Interface
//!
//! The listener reports hardware changes upward through a
//! [`HardwareObserver`]. Hosts that prefer messages over callbacks can use
//! [`ChannelObserver`], which forwards every notification as a
//! [`HardwareEvent`].

use tokio::sync::mpsc;

use crate::model::ActuatorMetadata;
use crate::protocol::DeviceId;

/// Receives hardware notifications from the listener
///
/// Called from the listener task; implementations must not block.
pub trait HardwareObserver: Send {
    /// A device was described and registered
    fn hardware_added(&mut self, uri: &str, label: &str, version: &str);

    /// One usable actuator of a registered device
    fn actuator_added(&mut self, device_id: DeviceId, actuator_id: u32, metadata: &ActuatorMetadata);

    /// A device went away; all of its actuators are gone
    fn actuator_removed(&mut self, device_id: DeviceId);
}

impl<T: HardwareObserver + ?Sized> HardwareObserver for Box<T> {
    fn hardware_added(&mut self, uri: &str, label: &str, version: &str) {
        (**self).hardware_added(uri, label, version);
    }

    fn actuator_added(&mut self, device_id: DeviceId, actuator_id: u32, metadata: &ActuatorMetadata) {
        (**self).actuator_added(device_id, actuator_id, metadata);
    }

    fn actuator_removed(&mut self, device_id: DeviceId) {
        (**self).actuator_removed(device_id);
    }
}

/// Notification as a value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HardwareEvent {
    /// See [`HardwareObserver::hardware_added`]
    HardwareAdded {
        /// Device URI
        uri: String,
        /// Symbolified device label
        label: String,
        /// Firmware version
        version: String,
    },
    /// See [`HardwareObserver::actuator_added`]
    ActuatorAdded {
        /// Owning device
        device_id: DeviceId,
        /// Actuator id within the device
        actuator_id: u32,
        /// Host metadata
        metadata: ActuatorMetadata,
    },
    /// See [`HardwareObserver::actuator_removed`]
    ActuatorRemoved {
        /// Device that went away
        device_id: DeviceId,
    },
}

/// Observer that forwards notifications over an unbounded channel
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<HardwareEvent>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HardwareEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: HardwareEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Hardware event receiver dropped");
        }
    }
}

impl HardwareObserver for ChannelObserver {
    fn hardware_added(&mut self, uri: &str, label: &str, version: &str) {
        self.forward(HardwareEvent::HardwareAdded {
            uri: uri.to_string(),
            label: label.to_string(),
            version: version.to_string(),
        });
    }

    fn actuator_added(&mut self, device_id: DeviceId, actuator_id: u32, metadata: &ActuatorMetadata) {
        self.forward(HardwareEvent::ActuatorAdded {
            device_id,
            actuator_id,
            metadata: metadata.clone(),
        });
    }

    fn actuator_removed(&mut self, device_id: DeviceId) {
        self.forward(HardwareEvent::ActuatorRemoved { device_id });
    }
}

//! Unsolicited Event Channel
//!
//! Once the daemon acknowledges `device_status {"enable": 1}` the channel is
//! armed and every frame read while no request is in flight is treated as
//! an event. Frames read before that are rejected. Only `device_status` is
//! understood.

use crate::error::ProtocolError;
use crate::protocol::{DeviceId, Envelope, Event};

/// What a `device_status` event asks the listener to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatusChange {
    /// Device appeared; fetch and ingest its descriptor
    Connected(DeviceId),
    /// Device went away; notify removal
    Disconnected(DeviceId),
}

impl DeviceStatusChange {
    /// Device the change is about
    #[must_use]
    pub fn device_id(self) -> DeviceId {
        match self {
            Self::Connected(id) | Self::Disconnected(id) => id,
        }
    }
}

/// Whether frames between requests should be read as events
#[derive(Debug, Default)]
pub struct EventChannel {
    armed: bool,
}

impl EventChannel {
    /// Create a disarmed channel
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start reading events
    pub fn arm(&mut self) {
        if !self.armed {
            tracing::debug!("Event channel armed");
        }
        self.armed = true;
    }

    /// Stop reading events
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Whether events are being read
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Decode a frame read while no request was pending
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EventsDisabled` while the channel is disarmed
    /// - `ProtocolError::UnsolicitedReply` for a reply nobody asked for
    /// - `ProtocolError::UnknownEvent` / `Malformed` for anything else unusable
    pub fn interpret(&self, payload: &[u8]) -> Result<DeviceStatusChange, ProtocolError> {
        if !self.armed {
            return Err(ProtocolError::EventsDisabled);
        }
        match Envelope::parse(payload)? {
            Envelope::Reply { name, .. } => Err(ProtocolError::UnsolicitedReply(name)),
            Envelope::Event { name, data } => match Event::decode(&name, data)? {
                Event::DeviceStatus(status) if status.status => {
                    Ok(DeviceStatusChange::Connected(status.device_id))
                }
                Event::DeviceStatus(status) => Ok(DeviceStatusChange::Disconnected(status.device_id)),
            },
        }
    }
}

//! Daemon Wire Vocabulary
//!
//! The daemon understands exactly three requests and emits one kind of
//! event. Every frame is a JSON object keyed by its kind:
//!
//! ```text
//! request: {"request": "<name>", "data": <payload or null>}
//! reply:   {"reply":   "<name>", "data": <payload>}
//! event:   {"event":   "<name>", "data": <payload>}
//! ```
//!
//! Incoming frames are first split into an [`Envelope`] by the `reply` /
//! `event` discriminant, then the payload is decoded into one of the closed
//! set of variants ([`Reply`], [`Event`]). Anything outside that set is a
//! malformed frame.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::transport::frame;

/// `device_list` request / reply name
pub const DEVICE_LIST: &str = "device_list";
/// `device_descriptor` request / reply name
pub const DEVICE_DESCRIPTOR: &str = "device_descriptor";
/// `device_status` request / reply / event name
pub const DEVICE_STATUS: &str = "device_status";

/// Daemon-assigned device identifier
///
/// Only meaningful for the lifetime of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Requests the listener can send
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Enumerate connected devices
    DeviceList,
    /// Fetch one device's descriptor
    DeviceDescriptor {
        /// Device to describe
        device_id: DeviceId,
    },
    /// Turn the `device_status` event stream on or off
    DeviceStatus {
        /// Whether events should be sent
        enable: bool,
    },
}

impl Request {
    /// Name used on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceList => DEVICE_LIST,
            Self::DeviceDescriptor { .. } => DEVICE_DESCRIPTOR,
            Self::DeviceStatus { .. } => DEVICE_STATUS,
        }
    }

    /// Payload carried in the `data` field
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::DeviceList => Value::Null,
            Self::DeviceDescriptor { device_id } => serde_json::json!({ "device_id": device_id }),
            Self::DeviceStatus { enable } => serde_json::json!({ "enable": u8::from(*enable) }),
        }
    }

    /// Build the wire object
    #[must_use]
    pub fn to_frame(&self) -> RequestFrame {
        RequestFrame {
            request: self.name().to_string(),
            data: self.data(),
        }
    }

    /// Encode as a NUL-terminated frame
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Serialization` if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        frame::encode(&self.to_frame())
    }
}

/// Request object as it appears on the wire
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Request name
    pub request: String,
    /// Request payload (`null` when there is none)
    #[serde(default)]
    pub data: Value,
}

// ============================================================================
// Payloads
// ============================================================================

/// Reply payload of `device_descriptor`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable device URI
    pub uri: String,
    /// Human readable label
    pub label: String,
    /// Firmware version
    pub version: String,
    /// Controls on the device
    #[serde(default)]
    pub actuators: Vec<ActuatorDescriptor>,
}

/// One actuator entry inside a [`DeviceDescriptor`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorDescriptor {
    /// Id unique within the device
    pub id: u32,
    /// Actuator name
    pub name: String,
    /// Mode bitmask (see [`crate::model::ActuatorModes`])
    pub supported_modes: u32,
    /// How many assignments the actuator accepts
    pub max_assignments: u32,
}

/// Payload of the `device_status` event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusEvent {
    /// Device the event is about
    pub device_id: DeviceId,
    /// `true` when the device connected, `false` when it went away
    #[serde(deserialize_with = "deserialize_truthy")]
    pub status: bool,
}

/// Accept booleans as well as the integers the daemon sometimes sends
fn deserialize_truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    })
}

// ============================================================================
// Incoming frames
// ============================================================================

/// First-stage decode: kind and name, payload still raw
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// `{"reply": name, "data": ...}`
    Reply {
        /// Reply name
        name: String,
        /// Raw payload
        data: Value,
    },
    /// `{"event": name, "data": ...}`
    Event {
        /// Event name
        name: String,
        /// Raw payload
        data: Value,
    },
}

impl Envelope {
    /// Parse a frame payload (terminator already stripped)
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Malformed` unless the payload is a JSON object
    /// with a string `reply` or `event` key.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(payload);
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let Value::Object(mut object) = value else {
            return Err(ProtocolError::Malformed("frame is not a JSON object".into()));
        };
        let data = object.remove("data").unwrap_or(Value::Null);

        if let Some(name) = object.remove("reply") {
            let Value::String(name) = name else {
                return Err(ProtocolError::Malformed("'reply' is not a string".into()));
            };
            return Ok(Self::Reply { name, data });
        }

        if let Some(name) = object.remove("event") {
            let Value::String(name) = name else {
                return Err(ProtocolError::Malformed("'event' is not a string".into()));
            };
            return Ok(Self::Event { name, data });
        }

        Err(ProtocolError::Malformed(
            "frame has neither 'reply' nor 'event'".into(),
        ))
    }
}

/// Decoded reply
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Ids of connected devices
    DeviceList(Vec<DeviceId>),
    /// One device's descriptor
    DeviceDescriptor(DeviceDescriptor),
    /// Acknowledgement of a `device_status` request
    DeviceStatus(Value),
}

impl Reply {
    /// Decode the payload of a reply called `name`
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownReply` for names outside the vocabulary
    /// - `ProtocolError::Malformed` if the payload has the wrong shape
    pub fn decode(name: &str, data: Value) -> Result<Self, ProtocolError> {
        let malformed = |e: serde_json::Error| ProtocolError::Malformed(format!("{name}: {e}"));
        match name {
            DEVICE_LIST => serde_json::from_value(data)
                .map(Self::DeviceList)
                .map_err(malformed),
            DEVICE_DESCRIPTOR => serde_json::from_value(data)
                .map(Self::DeviceDescriptor)
                .map_err(malformed),
            DEVICE_STATUS => Ok(Self::DeviceStatus(data)),
            other => Err(ProtocolError::UnknownReply(other.to_string())),
        }
    }

    /// Name used on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceList(_) => DEVICE_LIST,
            Self::DeviceDescriptor(_) => DEVICE_DESCRIPTOR,
            Self::DeviceStatus(_) => DEVICE_STATUS,
        }
    }

    /// Payload as it appeared in the `data` field
    #[must_use]
    pub fn into_data(self) -> Value {
        match self {
            Self::DeviceList(ids) => serde_json::json!(ids),
            Self::DeviceDescriptor(descriptor) => {
                serde_json::to_value(descriptor).unwrap_or(Value::Null)
            }
            Self::DeviceStatus(data) => data,
        }
    }
}

/// Decoded unsolicited event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    /// A device connected or disconnected
    DeviceStatus(DeviceStatusEvent),
}

impl Event {
    /// Decode the payload of an event called `name`
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` for names outside the vocabulary
    /// - `ProtocolError::Malformed` if the payload has the wrong shape
    pub fn decode(name: &str, data: Value) -> Result<Self, ProtocolError> {
        match name {
            DEVICE_STATUS => serde_json::from_value(data)
                .map(Self::DeviceStatus)
                .map_err(|e| ProtocolError::Malformed(format!("{name}: {e}"))),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

/// Fully decoded incoming frame
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Reply to a request
    Reply(Reply),
    /// Unsolicited event
    Event(Event),
}

impl Frame {
    /// Parse and decode a frame payload
    ///
    /// # Errors
    ///
    /// Any [`ProtocolError`] from [`Envelope::parse`], [`Reply::decode`] or
    /// [`Event::decode`].
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        match Envelope::parse(payload)? {
            Envelope::Reply { name, data } => Reply::decode(&name, data).map(Self::Reply),
            Envelope::Event { name, data } => Event::decode(&name, data).map(Self::Event),
        }
    }
}

//! Device and Actuator Model
//!
//! Records built from daemon descriptors, plus the metadata object that is
//! handed to the host application for every surfaced actuator.

use serde::{Deserialize, Serialize};

use crate::protocol::{ActuatorDescriptor, DeviceDescriptor, DeviceId};

/// Actuator can act as an on/off switch (`bypass`, `toggled`)
pub const MODE_TOGGLE: u32 = 0x01;
/// Actuator can fire momentary triggers
pub const MODE_TRIGGER: u32 = 0x02;
/// Actuator can step through an enumeration
pub const MODE_ENUMERATION: u32 = 0x04;

const KNOWN_MODES: u32 = MODE_TOGGLE | MODE_TRIGGER | MODE_ENUMERATION;

/// Set of capability tags derived from a `supported_modes` bitmask
///
/// Bits outside the known modes are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActuatorModes(u32);

impl ActuatorModes {
    /// Keep only the recognized bits of `bits`
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & KNOWN_MODES)
    }

    /// Recognized bits
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// No recognized mode
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `mode` is set
    #[must_use]
    pub fn contains(self, mode: u32) -> bool {
        mode != 0 && self.0 & mode == mode
    }

    /// Tags in canonical order
    #[must_use]
    pub fn tags(self) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(4);
        if self.contains(MODE_TOGGLE) {
            tags.extend(["bypass", "toggled"]);
        }
        if self.contains(MODE_TRIGGER) {
            tags.push("trigger");
        }
        if self.contains(MODE_ENUMERATION) {
            tags.push("enumeration");
        }
        tags
    }

    /// Host representation: every tag prefixed by `:` plus a trailing `:`
    ///
    /// `None` when no mode is recognized.
    ///
    /// ```
    /// use chain_core::model::{ActuatorModes, MODE_TOGGLE, MODE_TRIGGER};
    ///
    /// let modes = ActuatorModes::from_bits(MODE_TOGGLE | MODE_TRIGGER);
    /// assert_eq!(modes.to_tag_string().as_deref(), Some(":bypass:toggled:trigger:"));
    /// assert_eq!(ActuatorModes::from_bits(0).to_tag_string(), None);
    /// ```
    #[must_use]
    pub fn to_tag_string(self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::new();
        for tag in self.tags() {
            out.push(':');
            out.push_str(tag);
        }
        out.push(':');
        Some(out)
    }
}

/// Metadata delivered with `actuator_added`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorMetadata {
    /// `{device_uri}:{unique_index}:{actuator_id}`
    pub uri: String,
    /// `{device_label}:{actuator_name}`
    #[serde(rename = "name")]
    pub display_name: String,
    /// Mode tag string, e.g. `:bypass:toggled:`
    pub modes: String,
    /// Enumeration steps; empty until a collaborator fills them in
    pub steps: Vec<u32>,
    /// Maximum number of assignments
    pub max_assigns: u32,
}

/// One control surface on a device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actuator {
    /// Id unique within the device
    pub id: u32,
    /// Name reported by the device
    pub name: String,
    /// Globally unique actuator URI
    pub uri: String,
    /// Label shown to users
    pub display_name: String,
    /// Supported modes, never empty
    pub modes: ActuatorModes,
    /// Maximum number of assignments
    pub max_assigns: u32,
    /// Enumeration steps
    pub steps: Vec<u32>,
}

impl Actuator {
    /// Build an actuator of `device`, or `None` if it supports no known mode
    #[must_use]
    pub fn from_descriptor(
        device_uri: &str,
        device_label: &str,
        unique_index: usize,
        descriptor: &ActuatorDescriptor,
    ) -> Option<Self> {
        let modes = ActuatorModes::from_bits(descriptor.supported_modes);
        if modes.is_empty() {
            return None;
        }
        Some(Self {
            id: descriptor.id,
            name: descriptor.name.clone(),
            uri: format!("{device_uri}:{unique_index}:{}", descriptor.id),
            display_name: format!("{device_label}:{}", descriptor.name),
            modes,
            max_assigns: descriptor.max_assignments,
            steps: Vec::new(),
        })
    }

    /// Metadata object for the host
    #[must_use]
    pub fn metadata(&self) -> ActuatorMetadata {
        ActuatorMetadata {
            uri: self.uri.clone(),
            display_name: self.display_name.clone(),
            modes: self.modes.to_tag_string().unwrap_or_default(),
            steps: self.steps.clone(),
            max_assigns: self.max_assigns,
        }
    }
}

/// A registered hardware unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    /// Connection-scoped id
    pub device_id: DeviceId,
    /// Stable URI, free of whitespace
    pub uri: String,
    /// Label as reported by the device
    pub label: String,
    /// Firmware version
    pub version: String,
    /// Position among registered devices sharing `uri`
    pub unique_index: usize,
    /// Actuators that support at least one known mode
    pub actuators: Vec<Actuator>,
}

impl Device {
    /// Build a device record; actuators without a known mode are dropped
    #[must_use]
    pub fn from_descriptor(
        device_id: DeviceId,
        descriptor: &DeviceDescriptor,
        unique_index: usize,
    ) -> Self {
        let actuators = descriptor
            .actuators
            .iter()
            .filter_map(|a| {
                Actuator::from_descriptor(&descriptor.uri, &descriptor.label, unique_index, a)
            })
            .collect();

        Self {
            device_id,
            uri: descriptor.uri.clone(),
            label: descriptor.label.clone(),
            version: descriptor.version.clone(),
            unique_index,
            actuators,
        }
    }

    /// Label reduced to a symbol
    #[must_use]
    pub fn symbol(&self) -> String {
        symbolify(&self.label)
    }
}

/// Whether `uri` can identify a device
#[must_use]
pub fn is_valid_uri(uri: &str) -> bool {
    !uri.chars().any(char::is_whitespace)
}

/// Reduce a label to `[A-Za-z0-9_]`
///
/// Each run of other characters becomes a single `_`, a leading digit is
/// prefixed with `_`, and an empty label becomes `_`.
#[must_use]
pub fn symbolify(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actuator(id: u32, name: &str, modes: u32) -> ActuatorDescriptor {
        ActuatorDescriptor {
            id,
            name: name.to_string(),
            supported_modes: modes,
            max_assignments: 1,
        }
    }

    #[test]
    fn test_mode_tag_strings() {
        let cases = [
            (MODE_TOGGLE, Some(":bypass:toggled:")),
            (MODE_TRIGGER, Some(":trigger:")),
            (MODE_ENUMERATION, Some(":enumeration:")),
            (
                MODE_TOGGLE | MODE_TRIGGER | MODE_ENUMERATION,
                Some(":bypass:toggled:trigger:enumeration:"),
            ),
            (0, None),
            (0x08, None),
        ];
        for (bits, expected) in cases {
            assert_eq!(
                ActuatorModes::from_bits(bits).to_tag_string().as_deref(),
                expected,
                "bits {bits:#x}"
            );
        }
    }

    #[test]
    fn test_unknown_mode_bits_ignored() {
        let modes = ActuatorModes::from_bits(0xF0 | MODE_TRIGGER);
        assert_eq!(modes.bits(), MODE_TRIGGER);
        assert!(modes.contains(MODE_TRIGGER));
        assert!(!modes.contains(MODE_TOGGLE));
    }

    #[test]
    fn test_actuator_derived_fields() {
        let act = Actuator::from_descriptor("pedal1", "Pedal", 2, &actuator(5, "Foot", 1)).unwrap();

        assert_eq!(act.uri, "pedal1:2:5");
        assert_eq!(act.display_name, "Pedal:Foot");
        assert!(act.steps.is_empty());
    }

    #[test]
    fn test_actuator_without_modes_is_dropped() {
        assert!(Actuator::from_descriptor("pedal1", "Pedal", 0, &actuator(0, "Dead", 0)).is_none());
    }

    #[test]
    fn test_device_keeps_only_usable_actuators() {
        let descriptor = DeviceDescriptor {
            uri: "pedal1".into(),
            label: "Pedal".into(),
            version: "0.1.0".into(),
            actuators: vec![actuator(0, "A", 1), actuator(1, "B", 0), actuator(2, "C", 4)],
        };
        let device = Device::from_descriptor(DeviceId(7), &descriptor, 0);

        let ids: Vec<u32> = device.actuators.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_metadata_wire_shape() {
        let act = Actuator::from_descriptor("pedal1", "Pedal", 0, &actuator(3, "Foot", 1)).unwrap();

        assert_eq!(
            serde_json::to_value(act.metadata()).unwrap(),
            json!({
                "uri": "pedal1:0:3",
                "name": "Pedal:Foot",
                "modes": ":bypass:toggled:",
                "steps": [],
                "max_assigns": 1
            })
        );
    }

    #[test]
    fn test_uri_validation() {
        assert!(is_valid_uri("https://example.org/pedal"));
        assert!(is_valid_uri(""));
        assert!(!is_valid_uri("my pedal"));
        assert!(!is_valid_uri("pedal\t1"));
    }

    #[test]
    fn test_symbolify() {
        assert_eq!(symbolify("Pedal"), "Pedal");
        assert_eq!(symbolify("Foot Switch #2"), "Foot_Switch_2");
        assert_eq!(symbolify("1st"), "_1st");
        assert_eq!(symbolify(""), "_");
        assert_eq!(symbolify("a--b"), "a_b");
    }
}

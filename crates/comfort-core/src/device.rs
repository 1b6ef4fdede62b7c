//! Device and sensor representation

use crate::persistence::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor name for the ambient light level
pub const LIGHT_LEVEL: &str = "light_level";
/// Sensor name for the temperature (°C)
pub const TEMPERATURE: &str = "temperature";
/// Sensor name for the relative humidity (%)
pub const HUMIDITY: &str = "humidity";

/// Upper bound for fan speed and brightness levels
pub const MAX_LEVEL: u8 = 100;

/// On/off state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

impl Power {
    /// Parse a power value ("on"/"off", case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    /// Capitalised label used in status texts
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Off => "Off",
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
        })
    }
}

/// Canonical state of the controlled devices
///
/// Invariants: `fan == Off` implies `fan_speed == 0`, `fan_speed > 0`
/// implies `fan == On`, and the same pair holds for `light` and
/// `set_brightness`. The engine only mutates this through its action
/// applier, which enforces them at every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub fan: Power,
    pub fan_speed: u8,
    pub light: Power,
    pub set_brightness: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            fan: Power::On,
            fan_speed: 100,
            light: Power::Off,
            set_brightness: 0,
        }
    }
}

impl DeviceState {
    /// Check the cross-field invariants
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        // off <=> level 0 is one-directional: on with level 0 is allowed
        let fan_ok = self.fan.is_on() || self.fan_speed == 0;
        let light_ok = self.light.is_on() || self.set_brightness == 0;
        fan_ok && light_ok && self.fan_speed <= MAX_LEVEL && self.set_brightness <= MAX_LEVEL
    }
}

/// Latest sensor readings, written by the sensor ingestion side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub light_level: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            light_level: 80.0,
            temperature: 32.0,
            humidity: 50.0,
        }
    }
}

impl SensorReading {
    /// Readings by sensor name, in declaration order
    ///
    /// Rule resolution walks sensors in this order, so later sensors win
    /// when two of them set the same device field.
    #[must_use]
    pub fn readings(&self) -> [(&'static str, f64); 3] {
        [
            (LIGHT_LEVEL, self.light_level),
            (TEMPERATURE, self.temperature),
            (HUMIDITY, self.humidity),
        ]
    }

    /// Look up a reading by sensor name
    #[must_use]
    pub fn value(&self, sensor: &str) -> Option<f64> {
        self.readings()
            .into_iter()
            .find(|(name, _)| *name == sensor)
            .map(|(_, value)| value)
    }
}

/// The persisted document: sensor readings plus the device action state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub sensors: SensorReading,
    #[serde(default)]
    pub action: DeviceState,
}

impl Resource for Document {
    const FILE_NAME: &'static str = "data.json";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_parse() {
        assert_eq!(Power::parse("ON"), Some(Power::On));
        assert_eq!(Power::parse(" off "), Some(Power::Off));
        assert_eq!(Power::parse("dim"), None);
    }

    #[test]
    fn test_default_document_is_consistent() {
        let doc = Document::default();
        assert!(doc.action.is_consistent());
        assert_eq!(doc.sensors.temperature, 32.0);
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let state = DeviceState {
            fan: Power::Off,
            fan_speed: 40,
            ..DeviceState::default()
        };
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_sensor_lookup() {
        let sensors = SensorReading::default();
        assert_eq!(sensors.value(LIGHT_LEVEL), Some(80.0));
        assert_eq!(sensors.value("pressure"), None);
    }

    #[test]
    fn test_document_wire_format() {
        let json = serde_json::to_value(Document::default()).unwrap();
        assert_eq!(json["action"]["fan"], "on");
        assert_eq!(json["action"]["set_brightness"], 0);
        assert_eq!(json["sensors"]["humidity"], 50.0);
    }
}

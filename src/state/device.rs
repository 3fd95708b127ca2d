//! Rooms, devices and their typed values
//!
//! A device value can only be built inside its kind's domain, so an
//! out-of-range brightness or an unknown music state never reaches the
//! store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical room identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Room {
    LivingRoom,
    Bedroom,
    Kitchen,
}

impl Room {
    pub const ALL: [Room; 3] = [Room::LivingRoom, Room::Bedroom, Room::Kitchen];

    /// Canonical id, as used in persisted state and timer ids
    pub fn id(&self) -> &'static str {
        match self {
            Room::LivingRoom => "living-room",
            Room::Bedroom => "bedroom",
            Room::Kitchen => "kitchen",
        }
    }

    /// Name used in spoken confirmations
    pub fn display_name(&self) -> &'static str {
        match self {
            Room::LivingRoom => "living room",
            Room::Bedroom => "bedroom",
            Room::Kitchen => "kitchen",
        }
    }

    pub fn from_id(id: &str) -> Option<Room> {
        Room::ALL.into_iter().find(|room| room.id() == id)
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Device kinds a room can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Lights,
    Thermostat,
    Music,
    Security,
}

impl Device {
    pub fn name(&self) -> &'static str {
        match self {
            Device::Lights => "lights",
            Device::Thermostat => "thermostat",
            Device::Music => "music",
            Device::Security => "security",
        }
    }

    /// Value a timer leaves the device in when it fires.
    ///
    /// A thermostat has no off state, so it cannot be the target of a timer.
    pub fn off_value(&self) -> Option<DeviceValue> {
        match self {
            Device::Lights => Some(DeviceValue::Lights(Brightness::OFF)),
            Device::Music => Some(DeviceValue::Music(MusicState::Stopped)),
            Device::Security => Some(DeviceValue::Security(SecurityState::Disarmed)),
            Device::Thermostat => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Light level in percent, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Brightness(u8);

impl Brightness {
    pub const OFF: Brightness = Brightness(0);
    pub const FULL: Brightness = Brightness(100);

    /// Build a brightness, clamping into 0..=100
    pub const fn clamped(level: i64) -> Self {
        let level = if level < 0 {
            0
        } else if level > 100 {
            100
        } else {
            level
        };
        Self(level as u8)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicState {
    Playing,
    Paused,
    Stopped,
}

impl MusicState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicState::Playing => "playing",
            MusicState::Paused => "paused",
            MusicState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
    Armed,
    Disarmed,
}

impl SecurityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityState::Armed => "armed",
            SecurityState::Disarmed => "disarmed",
        }
    }
}

/// A device's value, tagged by device kind.
///
/// Serializes as the bare value (`100`, `"playing"`); the device key next
/// to it decides how it is read back, see [`DeviceValue::from_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeviceValue {
    Lights(Brightness),
    Thermostat(i32),
    Music(MusicState),
    Security(SecurityState),
}

/// A persisted value that does not belong to its device's domain
#[derive(Debug, Error, PartialEq)]
#[error("invalid {device} value: {value}")]
pub struct ValueError {
    pub device: Device,
    pub value: String,
}

impl DeviceValue {
    /// Device kind this value belongs to
    pub const fn device(&self) -> Device {
        match self {
            DeviceValue::Lights(_) => Device::Lights,
            DeviceValue::Thermostat(_) => Device::Thermostat,
            DeviceValue::Music(_) => Device::Music,
            DeviceValue::Security(_) => Device::Security,
        }
    }

    /// Read a bare JSON value as the given device's value
    pub fn from_json(device: Device, value: &serde_json::Value) -> Result<Self, ValueError> {
        let invalid = || ValueError {
            device,
            value: value.to_string(),
        };

        match device {
            Device::Lights => value
                .as_i64()
                .filter(|level| (0..=100).contains(level))
                .map(|level| DeviceValue::Lights(Brightness::clamped(level)))
                .ok_or_else(invalid),
            Device::Thermostat => value
                .as_i64()
                .and_then(|degrees| i32::try_from(degrees).ok())
                .map(DeviceValue::Thermostat)
                .ok_or_else(invalid),
            Device::Music => serde_json::from_value(value.clone())
                .map(DeviceValue::Music)
                .map_err(|_| invalid()),
            Device::Security => serde_json::from_value(value.clone())
                .map(DeviceValue::Security)
                .map_err(|_| invalid()),
        }
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceValue::Lights(level) => write!(f, "{}%", level.percent()),
            DeviceValue::Thermostat(degrees) => write!(f, "{} degrees", degrees),
            DeviceValue::Music(state) => write!(f, "{}", state.as_str()),
            DeviceValue::Security(state) => write!(f, "{}", state.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_brightness_is_clamped() {
        assert_eq!(Brightness::clamped(150).percent(), 100);
        assert_eq!(Brightness::clamped(-5).percent(), 0);
        assert_eq!(Brightness::clamped(42).percent(), 42);
    }

    #[test]
    fn test_value_serializes_bare() {
        let json = serde_json::to_string(&DeviceValue::Music(MusicState::Playing)).unwrap();
        assert_eq!(json, r#""playing""#);
        let json = serde_json::to_string(&DeviceValue::Lights(Brightness::FULL)).unwrap();
        assert_eq!(json, "100");
    }

    #[test]
    fn test_from_json_checks_domain() {
        assert_eq!(
            DeviceValue::from_json(Device::Security, &json!("armed")),
            Ok(DeviceValue::Security(SecurityState::Armed))
        );
        assert!(DeviceValue::from_json(Device::Music, &json!("loud")).is_err());
        assert!(DeviceValue::from_json(Device::Lights, &json!(140)).is_err());
        assert!(DeviceValue::from_json(Device::Lights, &json!("on")).is_err());
        assert_eq!(
            DeviceValue::from_json(Device::Thermostat, &json!(68)),
            Ok(DeviceValue::Thermostat(68))
        );
    }

    #[test]
    fn test_room_ids_round_trip() {
        for room in Room::ALL {
            assert_eq!(Room::from_id(room.id()), Some(room));
            let json = serde_json::to_string(&room).unwrap();
            assert_eq!(json, format!("\"{}\"", room.id()));
        }
    }

    #[test]
    fn test_thermostat_has_no_off_value() {
        assert!(Device::Thermostat.off_value().is_none());
        assert_eq!(
            Device::Music.off_value(),
            Some(DeviceValue::Music(MusicState::Stopped))
        );
    }
}

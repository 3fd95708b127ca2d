//! Intent module: what an utterance asks for
//!
//! The parser turns cleaned utterance text into one of these intents by
//! walking an ordered rule table; room phrases go through the normalizer.

mod normalize;
mod parser;

pub use normalize::RoomNormalizer;
pub use parser::Parser;

use serde::Serialize;

use crate::state::{Device, DeviceValue, Room};
use crate::transcribe::Backend;

/// Typed result of parsing one utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Device(DeviceCommand),
    Scene { name: String },
    Timer(TimerCommand),
    Settings { action: SettingsAction },
    Help,
}

/// Verb of a device command, kept for the confirmation wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    On,
    Off,
    Dim,
    Set,
    Play,
    Pause,
    Stop,
    Arm,
    Disarm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCommand {
    pub device: Device,
    pub room: Room,
    pub action: DeviceAction,
    pub value: DeviceValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerCommand {
    pub device: Device,
    pub room: Room,
    /// Spoken verb, "turn off" or "stop"
    pub action: String,
    pub duration: u32,
    pub unit: TimeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minute,
    Hour,
}

impl TimeUnit {
    /// Classify a spoken unit; anything mentioning hours is an hour
    pub fn from_spoken(unit: &str) -> Self {
        if unit.contains("hour") || unit.contains("hr") {
            TimeUnit::Hour
        } else {
            TimeUnit::Minute
        }
    }

    pub fn millis(&self) -> u64 {
        match self {
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
        }
    }

    pub fn label(&self, count: u32) -> &'static str {
        match (self, count) {
            (TimeUnit::Minute, 1) => "minute",
            (TimeUnit::Minute, _) => "minutes",
            (TimeUnit::Hour, 1) => "hour",
            (TimeUnit::Hour, _) => "hours",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "backend", rename_all = "snake_case")]
pub enum SettingsAction {
    EnableVoice,
    DisableVoice,
    UseBackend(Backend),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Brightness;

    #[test]
    fn test_time_unit_classification() {
        for unit in ["hour", "hours", "hr", "hrs"] {
            assert_eq!(TimeUnit::from_spoken(unit), TimeUnit::Hour);
        }
        for unit in ["minute", "minutes", "min", "mins", "moments"] {
            assert_eq!(TimeUnit::from_spoken(unit), TimeUnit::Minute);
        }
    }

    #[test]
    fn test_intent_serialization() {
        let intent = Intent::Device(DeviceCommand {
            device: Device::Lights,
            room: Room::LivingRoom,
            action: DeviceAction::On,
            value: DeviceValue::Lights(Brightness::FULL),
        });
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["type"], "device");
        assert_eq!(json["room"], "living-room");
        assert_eq!(json["value"], 100);
    }
}

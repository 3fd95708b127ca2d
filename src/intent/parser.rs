//! Ordered rule-table intent parser
//!
//! Rules are tried top to bottom and the first match wins; there is no
//! scoring and no backtracking into later rules. Precedence is the table
//! order:
//! 1. help, scenes, settings and timers (literal keyword phrasings)
//! 2. device rules, each family listing its most specific phrasing
//!    (explicit room) before the generic one (default room)

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use super::normalize::RoomNormalizer;
use super::{DeviceAction, DeviceCommand, Intent, SettingsAction, TimeUnit, TimerCommand};
use crate::state::{Brightness, Device, DeviceValue, MusicState, Room, SecurityState};
use crate::transcribe::Backend;

/// Level used by "dim the lights" when no number is spoken
const DIM_LEVEL: i64 = 30;

/// The security panel lives in the kitchen; bare security commands go there
const SECURITY_ROOM: Room = Room::Kitchen;

type Build = fn(&Captures<'_>, &RoomNormalizer) -> Intent;

struct Rule {
    name: &'static str,
    pattern: Regex,
    build: Build,
}

fn rule(name: &'static str, pattern: &str, build: Build) -> Rule {
    Rule {
        name,
        pattern: Regex::new(pattern).expect("rule patterns are static and valid"),
        build,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            "help",
            r"\b(?:help|what can you do|what can i say|commands)\b",
            |_, _| Intent::Help,
        ),
        // Scenes
        rule(
            "scene_movie",
            r"\b(?:(?:movie|cinema|film) (?:mode|time|night)|watch(?:ing)? a (?:movie|film))\b",
            |_, _| scene("movie"),
        ),
        rule(
            "scene_goodnight",
            r"\b(?:good ?night|bed ?time|sleep mode)\b",
            |_, _| scene("goodnight"),
        ),
        rule(
            "scene_morning",
            r"\b(?:good morning|morning (?:mode|routine)|wake up)\b",
            |_, _| scene("morning"),
        ),
        rule(
            "scene_party",
            r"\b(?:party (?:mode|time)|let'?s party)\b",
            |_, _| scene("party"),
        ),
        // Settings
        rule(
            "voice_on",
            r"\b(?:enable|turn on|activate) (?:the )?(?:voice|spoken|speech) (?:feedback|confirmations?|responses?)\b",
            |_, _| settings(SettingsAction::EnableVoice),
        ),
        rule(
            "voice_off",
            r"\b(?:disable|turn off|deactivate|mute) (?:the )?(?:voice|spoken|speech) (?:feedback|confirmations?|responses?)\b",
            |_, _| settings(SettingsAction::DisableVoice),
        ),
        rule(
            "backend_whisper",
            r"\b(?:use|switch to|enable) (?:the )?(?:whisper|offline)(?: (?:backend|mode|recognition))?\b",
            |_, _| settings(SettingsAction::UseBackend(Backend::Whisper)),
        ),
        rule(
            "backend_browser",
            r"\b(?:use|switch to|enable) (?:the )?(?:browser|online|web)(?: (?:backend|mode|recognition))?\b",
            |_, _| settings(SettingsAction::UseBackend(Backend::Browser)),
        ),
        // Timer
        rule(
            "timer",
            r"\b(?P<verb>turn off|stop) (?:the )?(?P<target>.+?) in (?P<count>\d{1,4}) (?P<unit>minutes?|mins?|hours?|hrs?)\b",
            timer,
        ),
        // Lights
        rule(
            "lights_in_room_on_off",
            r"\b(?:turn|switch) (?P<state>on|off) (?:the |all (?:the )?)?lights? in (?:the )?(?P<room>.+)$",
            |caps, rooms| lights_on_off(caps, room(caps, rooms)),
        ),
        rule(
            "lights_in_room_level",
            r"\b(?:set|dim) (?:the )?lights? in (?:the )?(?P<room>.+?) to (?P<level>\d+)",
            |caps, rooms| lights_level(caps, room(caps, rooms)),
        ),
        rule(
            "lights_trailing_state_in_room",
            r"\b(?:turn|switch) (?:the |all (?:the )?)?lights? (?P<state>on|off) in (?:the )?(?P<room>.+)$",
            |caps, rooms| lights_on_off(caps, room(caps, rooms)),
        ),
        rule(
            "lights_level_in_room",
            r"\b(?:set|dim) (?:the |all (?:the )?)?lights? to (?P<level>\d+)(?: ?(?:percent|%))? in (?:the )?(?P<room>.+)$",
            |caps, rooms| lights_level(caps, room(caps, rooms)),
        ),
        rule(
            "dim_lights_in_room",
            r"\bdim (?:the |all (?:the )?)?lights? in (?:the )?(?P<room>.+)$",
            |caps, rooms| {
                device(
                    room(caps, rooms),
                    DeviceAction::Dim,
                    DeviceValue::Lights(Brightness::clamped(DIM_LEVEL)),
                )
            },
        ),
        rule(
            "room_lights_on_off",
            r"\b(?:turn|switch) (?P<state>on|off) (?:the )?(?P<room>.+?) lights?\b",
            |caps, rooms| lights_on_off(caps, room(caps, rooms)),
        ),
        rule(
            "room_lights_trailing_state",
            r"\b(?:turn|switch) (?:the )?(?P<room>.+?) lights? (?P<state>on|off)\b",
            |caps, rooms| lights_on_off(caps, room(caps, rooms)),
        ),
        rule(
            "room_lights_level",
            r"\b(?:dim|set) (?:the )?(?P<room>.+?) lights? to (?P<level>\d+)",
            |caps, rooms| lights_level(caps, room(caps, rooms)),
        ),
        rule(
            "lights_level",
            r"\b(?:dim|set) (?:the )?lights? to (?P<level>\d+)",
            |caps, rooms| lights_level(caps, rooms.default_room()),
        ),
        rule(
            "dim_lights",
            r"\bdim (?:the )?(?:(?P<room>.+?) )?lights?\b",
            |caps, rooms| {
                device(
                    room(caps, rooms),
                    DeviceAction::Dim,
                    DeviceValue::Lights(Brightness::clamped(DIM_LEVEL)),
                )
            },
        ),
        rule(
            "lights_on_off",
            r"\b(?:turn|switch) (?P<state>on|off) (?:the )?lights?\b",
            |caps, rooms| lights_on_off(caps, rooms.default_room()),
        ),
        rule(
            "bare_lights_on_off",
            r"\blights? (?P<state>on|off)\b",
            |caps, rooms| lights_on_off(caps, rooms.default_room()),
        ),
        // Thermostat
        rule(
            "thermostat_in_room",
            r"\b(?:set|change) (?:the )?(?:thermostat|temperature|heat(?:ing)?) in (?:the )?(?P<room>.+?) to (?P<degrees>\d{1,3})\b",
            thermostat,
        ),
        rule(
            "thermostat",
            r"\b(?:set|change|turn) (?:the )?(?:(?P<room>.+?) )?(?:thermostat|temperature|heat(?:ing)?) (?:to|at) (?P<degrees>\d{1,3})\b",
            thermostat,
        ),
        // Music
        rule(
            "music_in_room",
            r"\b(?P<verb>play|pause|stop|resume) (?:the )?music in (?:the )?(?P<room>.+)$",
            music_verb,
        ),
        rule(
            "music",
            r"\b(?P<verb>play|pause|stop|resume) (?:the )?(?:(?P<room>.+?) )?music\b",
            music_verb,
        ),
        rule(
            "music_on_off",
            r"\b(?:turn|switch) (?P<state>on|off) (?:the )?(?:(?P<room>.+?) )?music\b",
            |caps, rooms| {
                let (action, state) = if is_on(caps) {
                    (DeviceAction::Play, MusicState::Playing)
                } else {
                    (DeviceAction::Stop, MusicState::Stopped)
                };
                device(room(caps, rooms), action, DeviceValue::Music(state))
            },
        ),
        // Security
        rule(
            "security",
            r"\b(?P<verb>arm|disarm|enable|disable|activate|deactivate) (?:the )?(?:(?P<room>.+?) )?(?:security|alarm)\b",
            |caps, rooms| {
                let arm = matches!(
                    caps.name("verb").map(|m| m.as_str()),
                    Some("arm" | "enable" | "activate")
                );
                security(security_room(caps, rooms), arm)
            },
        ),
        rule(
            "security_on_off",
            r"\bturn (?P<state>on|off) (?:the )?(?:(?P<room>.+?) )?(?:security|alarm)\b",
            |caps, rooms| security(security_room(caps, rooms), is_on(caps)),
        ),
        rule(
            "lock_up",
            r"\block (?:up|the house|the doors|everything)\b",
            |_, _| security(SECURITY_ROOM, true),
        ),
    ]
});

fn scene(name: &str) -> Intent {
    Intent::Scene {
        name: name.to_string(),
    }
}

fn settings(action: SettingsAction) -> Intent {
    Intent::Settings { action }
}

fn device(room: Room, action: DeviceAction, value: DeviceValue) -> Intent {
    Intent::Device(DeviceCommand {
        device: value.device(),
        room,
        action,
        value,
    })
}

fn room(caps: &Captures<'_>, rooms: &RoomNormalizer) -> Room {
    caps.name("room")
        .map(|m| rooms.normalize(m.as_str()))
        .unwrap_or_else(|| rooms.default_room())
}

fn security_room(caps: &Captures<'_>, rooms: &RoomNormalizer) -> Room {
    caps.name("room")
        .map(|m| rooms.normalize(m.as_str()))
        .unwrap_or(SECURITY_ROOM)
}

fn is_on(caps: &Captures<'_>) -> bool {
    caps.name("state").map(|m| m.as_str()) == Some("on")
}

/// Digits of a named group; saturates instead of overflowing
fn number(caps: &Captures<'_>, group: &str) -> i64 {
    caps.name(group)
        .map(|m| m.as_str().parse().unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn lights_on_off(caps: &Captures<'_>, room: Room) -> Intent {
    if is_on(caps) {
        device(room, DeviceAction::On, DeviceValue::Lights(Brightness::FULL))
    } else {
        device(room, DeviceAction::Off, DeviceValue::Lights(Brightness::OFF))
    }
}

fn lights_level(caps: &Captures<'_>, room: Room) -> Intent {
    let level = Brightness::clamped(number(caps, "level"));
    device(room, DeviceAction::Dim, DeviceValue::Lights(level))
}

fn thermostat(caps: &Captures<'_>, rooms: &RoomNormalizer) -> Intent {
    let degrees = number(caps, "degrees") as i32;
    device(room(caps, rooms), DeviceAction::Set, DeviceValue::Thermostat(degrees))
}

fn music_verb(caps: &Captures<'_>, rooms: &RoomNormalizer) -> Intent {
    let (action, state) = match caps.name("verb").map(|m| m.as_str()) {
        Some("pause") => (DeviceAction::Pause, MusicState::Paused),
        Some("stop") => (DeviceAction::Stop, MusicState::Stopped),
        _ => (DeviceAction::Play, MusicState::Playing),
    };
    device(room(caps, rooms), action, DeviceValue::Music(state))
}

fn security(room: Room, arm: bool) -> Intent {
    if arm {
        device(room, DeviceAction::Arm, DeviceValue::Security(SecurityState::Armed))
    } else {
        device(room, DeviceAction::Disarm, DeviceValue::Security(SecurityState::Disarmed))
    }
}

/// Device words a timer target may carry, checked in order
const TIMER_DEVICES: &[(&str, Device)] = &[
    ("lights", Device::Lights),
    ("light", Device::Lights),
    ("music", Device::Music),
    ("thermostat", Device::Thermostat),
    ("heating", Device::Thermostat),
    ("security", Device::Security),
    ("alarm", Device::Security),
];

fn timer(caps: &Captures<'_>, rooms: &RoomNormalizer) -> Intent {
    let verb = caps.name("verb").map(|m| m.as_str()).unwrap_or("turn off");
    let target = caps.name("target").map(|m| m.as_str()).unwrap_or("");

    // "stop" with no device word means the music
    let mut device = if verb == "stop" {
        Device::Music
    } else {
        Device::Lights
    };
    let mut room_words = Vec::new();
    let mut found = false;
    for word in target.split_whitespace() {
        match TIMER_DEVICES.iter().find(|(name, _)| *name == word) {
            Some((_, named)) if !found => {
                device = *named;
                found = true;
            }
            _ if matches!(word, "in" | "the") => {}
            _ => room_words.push(word),
        }
    }

    let unit = caps.name("unit").map(|m| m.as_str()).unwrap_or("minutes");
    Intent::Timer(TimerCommand {
        device,
        room: rooms.normalize(&room_words.join(" ")),
        action: verb.to_string(),
        duration: number(caps, "count") as u32,
        unit: TimeUnit::from_spoken(unit),
    })
}

/// Lower-case, drop sentence punctuation and collapse whitespace
fn clean(utterance: &str) -> String {
    utterance
        .to_lowercase()
        .replace(['.', ',', '!', '?'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stateless parser over the shared rule table
#[derive(Debug, Clone, Default)]
pub struct Parser {
    rooms: RoomNormalizer,
}

impl Parser {
    pub fn new(rooms: RoomNormalizer) -> Self {
        Self { rooms }
    }

    /// Parse an utterance into an intent, `None` when no rule matches
    pub fn parse(&self, utterance: &str) -> Option<Intent> {
        self.parse_with_rule(utterance).map(|(_, intent)| intent)
    }

    /// Like [`Parser::parse`], also naming the rule that matched
    pub fn parse_with_rule(&self, utterance: &str) -> Option<(&'static str, Intent)> {
        let text = clean(utterance);
        if text.is_empty() {
            return None;
        }

        RULES.iter().find_map(|rule| {
            rule.pattern.captures(&text).map(|caps| {
                debug!(rule = rule.name, text = %text, "utterance matched");
                (rule.name, (rule.build)(&caps, &self.rooms))
            })
        })
    }

    /// Rule names in evaluation order
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|rule| rule.name)
    }
}

//! Events module for feedback and state notifications
//!
//! Everything user-facing leaves the core as a `HomeEvent` on a broadcast
//! channel. Sending never blocks and does not care whether anyone is
//! listening.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::command::{HistoryEntry, Settings};
use crate::schedule::TimerInfo;
use crate::state::{Device, DeviceValue, Room};

/// Tone of a feedback message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Normal,
    Success,
    Error,
}

/// User-facing text produced for one command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub text: String,
    pub kind: FeedbackKind,
}

impl Feedback {
    pub fn normal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FeedbackKind::Normal,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FeedbackKind::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: FeedbackKind::Error,
        }
    }
}

/// Events emitted by the command engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HomeEvent {
    /// Text for the log panel, spoken too when `speak` is set
    Feedback {
        text: String,
        kind: FeedbackKind,
        speak: bool,
    },

    /// A device took a new value
    DeviceChanged {
        room: Room,
        device: Device,
        value: DeviceValue,
    },

    SceneStarted { id: String, name: String },

    /// All steps of a scene have been applied
    SceneCompleted { id: String, name: String },

    TimerScheduled { timer: TimerInfo },

    TimerFired { id: String },

    TimerCancelled { id: String },

    /// An utterance was processed (parsed or not)
    CommandProcessed { entry: HistoryEntry },

    SettingsChanged { settings: Settings },
}

impl std::fmt::Display for HomeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HomeEvent::Feedback { text, kind, .. } => write!(f, "FEEDBACK ({:?}): {}", kind, text),
            HomeEvent::DeviceChanged {
                room,
                device,
                value,
            } => write!(f, "DEVICE_CHANGED {}.{} = {}", room, device, value),
            HomeEvent::SceneStarted { name, .. } => write!(f, "SCENE_STARTED {}", name),
            HomeEvent::SceneCompleted { name, .. } => write!(f, "SCENE_COMPLETED {}", name),
            HomeEvent::TimerScheduled { timer } => write!(f, "TIMER_SCHEDULED {}", timer.id),
            HomeEvent::TimerFired { id } => write!(f, "TIMER_FIRED {}", id),
            HomeEvent::TimerCancelled { id } => write!(f, "TIMER_CANCELLED {}", id),
            HomeEvent::CommandProcessed { entry } => {
                write!(f, "COMMAND_PROCESSED {:?} (success: {})", entry.utterance, entry.success)
            }
            HomeEvent::SettingsChanged { settings } => write!(
                f,
                "SETTINGS_CHANGED voice={} backend={}",
                settings.voice_confirmation, settings.backend
            ),
        }
    }
}

/// Fire-and-forget sender shared by the orchestrator and schedulers
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<HomeEvent>,
    speak: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<HomeEvent>, speak: bool) -> Self {
        Self {
            tx,
            speak: Arc::new(AtomicBool::new(speak)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HomeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: HomeEvent) {
        debug!(%event, "emitting event");
        // No receivers is fine: feedback is best effort
        let _ = self.tx.send(event);
    }

    /// Emit feedback, marked for speech when voice confirmation is on
    pub fn feedback(&self, feedback: &Feedback) {
        self.emit(HomeEvent::Feedback {
            text: feedback.text.clone(),
            kind: feedback.kind,
            speak: self.voice_enabled(),
        });
    }

    pub fn voice_enabled(&self) -> bool {
        self.speak.load(Ordering::Relaxed)
    }

    pub fn set_voice(&self, enabled: bool) {
        self.speak.store(enabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Brightness;

    #[test]
    fn test_event_serialization() {
        let event = HomeEvent::DeviceChanged {
            room: Room::Kitchen,
            device: Device::Lights,
            value: DeviceValue::Lights(Brightness::clamped(40)),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("device_changed"));
        assert!(json.contains(r#""room":"kitchen""#));
        assert!(json.contains(r#""value":40"#));
    }

    #[test]
    fn test_feedback_carries_voice_flag() {
        let (tx, mut rx) = broadcast::channel(4);
        let sink = EventSink::new(tx, true);

        sink.feedback(&Feedback::success("done"));
        sink.set_voice(false);
        sink.feedback(&Feedback::error("nope"));

        assert!(matches!(
            rx.try_recv().unwrap(),
            HomeEvent::Feedback { speak: true, kind: FeedbackKind::Success, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            HomeEvent::Feedback { speak: false, kind: FeedbackKind::Error, .. }
        ));
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = broadcast::channel(1);
        drop(rx);
        let sink = EventSink::new(tx, false);
        sink.emit(HomeEvent::TimerFired { id: "t".into() });
    }
}

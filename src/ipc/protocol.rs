//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::command::{HistoryEntry, Settings};
use crate::events::{Feedback, HomeEvent};
use crate::schedule::TimerInfo;
use crate::state::Snapshot;
use crate::transcribe::{Models, WhisperModel};

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// A transcribed utterance from the client's recognizer
    Utterance {
        text: String,
        #[serde(default)]
        confidence: Option<f32>,
    },

    /// Raw audio for the Whisper backend, base64 encoded
    Audio {
        data: String,
        #[serde(default)]
        sample_rate: Option<u32>,
    },

    GetDevices,

    GetTimers,

    CancelTimer { id: String },

    GetHistory,

    /// Models the Whisper service offers and the one it has loaded
    GetModels,

    /// Ask the Whisper service to load another model
    SwitchModel { model: WhisperModel },

    /// Subscribe to pushed events; the connection is push-only afterwards
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Outcome of an utterance
    Feedback(Feedback),

    Devices { devices: Snapshot },

    Timers { timers: Vec<TimerInfo> },

    TimerCancelled { id: String, cancelled: bool },

    /// Newest first
    History { entries: Vec<HistoryEntry> },

    Models(Models),

    ModelSwitched {
        model: WhisperModel,
        message: Option<String>,
    },

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Event { event: HomeEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub settings: Settings,

    pub active_timers: usize,
}

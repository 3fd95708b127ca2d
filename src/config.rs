//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::command::CommandConfig;
use crate::state::Room;

const DEFAULT_WHISPER_URL: &str = "http://localhost:5000";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Persisted device state
    pub state_path: PathBuf,

    /// Base URL of the Whisper transcription service
    pub whisper_url: String,

    /// Request timeout for the transcription service
    pub http_timeout: Duration,

    pub command: CommandConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("smart-home-voice");

        let mut command = CommandConfig::default();
        if let Some(raw) = var("SMART_HOME_CONFIDENCE_THRESHOLD") {
            command.confidence_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid SMART_HOME_CONFIDENCE_THRESHOLD: {raw}"))?;
        }
        if let Some(raw) = var("SMART_HOME_DEFAULT_ROOM") {
            command.default_room = Room::from_id(raw.trim())
                .with_context(|| format!("unknown SMART_HOME_DEFAULT_ROOM: {raw}"))?;
        }
        if let Some(raw) = var("SMART_HOME_REPLACE_TIMERS") {
            command.replace_pending_timers = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        Ok(Self {
            socket_path: data_dir.join("daemon.sock"),
            state_path: data_dir.join("devices.json"),
            data_dir,
            whisper_url: var("SMART_HOME_WHISPER_URL")
                .unwrap_or_else(|| DEFAULT_WHISPER_URL.to_string()),
            http_timeout: Duration::from_secs(10),
            command,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

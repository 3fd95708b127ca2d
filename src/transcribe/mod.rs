//! Transcription backends
//!
//! Utterances arrive either already transcribed by the in-process browser
//! recognizer, or as audio that is forwarded to the offline Whisper
//! service. The daemon never does acoustic work itself.

mod whisper;

pub use whisper::{Models, TranscriptionStatus, WhisperClient, WhisperModel};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which recognizer produces utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Client-side recognizer, sends text
    #[default]
    Browser,
    /// Offline Whisper service, sends audio
    Whisper,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Browser => write!(f, "browser"),
            Backend::Whisper => write!(f, "whisper"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription service is not ready: {0}")]
    NotReady(String),

    #[error("transcription failed: {0}")]
    Failed(String),
}

/// Reports whether the offline backend can take requests
#[async_trait]
pub trait BackendHealth: Send + Sync {
    async fn is_available(&self) -> bool;
}

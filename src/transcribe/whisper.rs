//! HTTP client for the offline Whisper transcription service
//!
//! `GET /health` reports readiness; `POST /transcribe` takes a multipart
//! form with an `audio` file part and an optional `sample_rate`.
//! `GET /models` and `POST /switch_model` inspect and change the loaded
//! Whisper model.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BackendHealth, TranscribeError};

/// Body of `GET /health`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Success,
    NoSpeechDetected,
    Error,
    Initializing,
}

/// Body of `POST /transcribe`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transcription {
    pub status: TranscriptionStatus,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    /// Seconds spent on the server
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Model sizes the service can load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::Large => "large",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelInfo {
    pub size: String,
    pub speed: String,
    pub accuracy: String,
}

/// Body of `GET /models`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Models {
    /// `None` until the service has loaded a model
    #[serde(default)]
    pub current_model: Option<String>,
    #[serde(default)]
    pub available_models: BTreeMap<String, ModelInfo>,
}

/// Body of `POST /switch_model`, on success and on failure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelSwitch {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub model: Option<WhisperModel>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhisperClient {
    base_url: String,
    client: reqwest::Client,
}

impl WhisperClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TranscribeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!(base_url, "whisper client configured");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn health(&self) -> Result<Health, TranscribeError> {
        let health = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<Health>()
            .await?;

        debug!(status = %health.status, model = ?health.model, "whisper health");
        Ok(health)
    }

    pub async fn models(&self) -> Result<Models, TranscribeError> {
        let models = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<Models>()
            .await?;
        debug!(current = ?models.current_model, available = models.available_models.len(), "whisper models");
        Ok(models)
    }

    /// Load a different model; the service answers once it is loaded
    pub async fn switch_model(&self, model: WhisperModel) -> Result<ModelSwitch, TranscribeError> {
        let response = self
            .client
            .post(format!("{}/switch_model", self.base_url))
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await?;

        let status = response.status();
        let switch = response.json::<ModelSwitch>().await?;
        check_switch(status, switch)
    }

    /// Send 16-bit PCM audio for transcription
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        sample_rate: u32,
    ) -> Result<Transcription, TranscribeError> {
        let form = reqwest::multipart::Form::new()
            .part(
                "audio",
                reqwest::multipart::Part::bytes(audio).file_name("audio.wav"),
            )
            .text("sample_rate", sample_rate.to_string());

        // The service answers 503 with a JSON body while the model loads
        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(TranscribeError::NotReady("model is still loading".to_string()));
        }

        let transcription = response.error_for_status()?.json::<Transcription>().await?;
        match transcription.status {
            TranscriptionStatus::Error => Err(TranscribeError::Failed(
                transcription
                    .error
                    .unwrap_or_else(|| "unknown error".to_string()),
            )),
            TranscriptionStatus::Initializing => {
                Err(TranscribeError::NotReady("model is still loading".to_string()))
            }
            _ => {
                debug!(
                    text = %transcription.text,
                    confidence = transcription.confidence,
                    processing_time = transcription.processing_time,
                    "transcription received"
                );
                Ok(transcription)
            }
        }
    }
}

#[async_trait]
impl BackendHealth for WhisperClient {
    async fn is_available(&self) -> bool {
        match self.health().await {
            Ok(health) => health.is_healthy(),
            Err(e) => {
                warn!(error = %e, "whisper health check failed");
                false
            }
        }
    }
}

/// Error bodies carry 400/500 with `error` set; success says `"success"`
fn check_switch(
    status: reqwest::StatusCode,
    switch: ModelSwitch,
) -> Result<ModelSwitch, TranscribeError> {
    if status.is_success() && switch.status == "success" {
        info!(model = ?switch.model, "whisper model switched");
        return Ok(switch);
    }
    Err(TranscribeError::Failed(switch.error.unwrap_or_else(|| {
        format!("model switch failed with status {}", status)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_deserialization() {
        let json = r#"{"text":"turn on the lights","confidence":0.83,"processing_time":0.41,"status":"success","segments":[]}"#;
        let transcription: Transcription = serde_json::from_str(json).unwrap();
        assert_eq!(transcription.status, TranscriptionStatus::Success);
        assert_eq!(transcription.text, "turn on the lights");
    }

    #[test]
    fn test_no_speech_deserialization() {
        let json = r#"{"text":"","confidence":0.0,"processing_time":0.02,"status":"no_speech_detected"}"#;
        let transcription: Transcription = serde_json::from_str(json).unwrap();
        assert_eq!(transcription.status, TranscriptionStatus::NoSpeechDetected);
    }

    #[test]
    fn test_health_status() {
        let health: Health =
            serde_json::from_str(r#"{"status":"initializing","model":null}"#).unwrap();
        assert!(!health.is_healthy());
        let health: Health = serde_json::from_str(r#"{"status":"healthy","model":"base"}"#).unwrap();
        assert!(health.is_healthy());
    }

    #[test]
    fn test_models_deserialization() {
        let json = r#"{
            "current_model": "base",
            "available_models": {
                "tiny": {"size": "39 MB", "speed": "~32x realtime", "accuracy": "Good"},
                "base": {"size": "74 MB", "speed": "~16x realtime", "accuracy": "Better"}
            }
        }"#;
        let models: Models = serde_json::from_str(json).unwrap();
        assert_eq!(models.current_model.as_deref(), Some("base"));
        assert_eq!(models.available_models["tiny"].size, "39 MB");

        let models: Models =
            serde_json::from_str(r#"{"current_model":null,"available_models":{}}"#).unwrap();
        assert!(models.current_model.is_none());
    }

    #[test]
    fn test_model_names() {
        let model: WhisperModel = serde_json::from_str(r#""medium""#).unwrap();
        assert_eq!(model, WhisperModel::Medium);
        assert_eq!(model.to_string(), "medium");
        assert!(serde_json::from_str::<WhisperModel>(r#""huge""#).is_err());
    }

    #[test]
    fn test_switch_outcomes() {
        let ok: ModelSwitch = serde_json::from_str(
            r#"{"status":"success","message":"Switched to small model","model":"small"}"#,
        )
        .unwrap();
        let switch = check_switch(reqwest::StatusCode::OK, ok).unwrap();
        assert_eq!(switch.model, Some(WhisperModel::Small));

        let failed: ModelSwitch = serde_json::from_str(
            r#"{"error":"Failed to switch model: out of memory","status":"error"}"#,
        )
        .unwrap();
        let err = check_switch(reqwest::StatusCode::INTERNAL_SERVER_ERROR, failed).unwrap_err();
        assert!(err.to_string().contains("out of memory"));

        let invalid: ModelSwitch = serde_json::from_str(r#"{"error":"Invalid model name"}"#).unwrap();
        assert!(check_switch(reqwest::StatusCode::BAD_REQUEST, invalid).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let client = WhisperClient::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9");
        assert!(!client.is_available().await);
    }
}

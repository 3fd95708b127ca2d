//! Process-wide settings changed by voice

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::CommandError;
use crate::events::{EventSink, Feedback, HomeEvent};
use crate::intent::SettingsAction;
use crate::transcribe::{Backend, BackendHealth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub voice_confirmation: bool,
    pub backend: Backend,
}

pub struct SettingsHandler {
    backend: RwLock<Backend>,
    events: EventSink,
    health: Arc<dyn BackendHealth>,
}

impl SettingsHandler {
    pub fn new(events: EventSink, health: Arc<dyn BackendHealth>) -> Self {
        Self {
            backend: RwLock::new(Backend::default()),
            events,
            health,
        }
    }

    pub async fn current(&self) -> Settings {
        Settings {
            voice_confirmation: self.events.voice_enabled(),
            backend: *self.backend.read().await,
        }
    }

    pub async fn apply(&self, action: SettingsAction) -> Result<Feedback, CommandError> {
        let feedback = match action {
            SettingsAction::EnableVoice => {
                self.events.set_voice(true);
                Feedback::success("Voice confirmation enabled")
            }
            SettingsAction::DisableVoice => {
                self.events.set_voice(false);
                Feedback::success("Voice confirmation disabled")
            }
            SettingsAction::UseBackend(Backend::Whisper) => {
                // Only switch once the service answers its health check
                if !self.health.is_available().await {
                    return Err(CommandError::BackendUnavailable(Backend::Whisper));
                }
                *self.backend.write().await = Backend::Whisper;
                Feedback::success("Switched to Whisper offline recognition")
            }
            SettingsAction::UseBackend(Backend::Browser) => {
                *self.backend.write().await = Backend::Browser;
                Feedback::success("Switched to browser speech recognition")
            }
        };

        let settings = self.current().await;
        info!(voice = settings.voice_confirmation, backend = %settings.backend, "settings changed");
        self.events.emit(HomeEvent::SettingsChanged { settings });
        Ok(feedback)
    }
}

//! Command failures and the message each one gives the user

use thiserror::Error;

use crate::state::{Device, DeviceValue, Room, StoreError};
use crate::transcribe::Backend;

/// Every way a command can fail. None of them stop the daemon.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("confidence {0:.2} is below the threshold")]
    LowConfidence(f32),

    #[error("no rule matched the utterance")]
    Unrecognized,

    #[error("room {0} not found")]
    RoomNotFound(Room),

    #[error("{room} has no {device}")]
    DeviceNotFound { room: Room, device: Device },

    #[error("{value} is not a valid {device} value")]
    InvalidValue { device: Device, value: DeviceValue },

    #[error("unknown scene {0:?}")]
    UnknownScene(String),

    #[error("{0} has no off state to time")]
    UnsupportedTimer(Device),

    #[error("{0} backend is unavailable")]
    BackendUnavailable(Backend),
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound(room) => CommandError::RoomNotFound(room),
            StoreError::DeviceNotFound { room, device } => {
                CommandError::DeviceNotFound { room, device }
            }
            StoreError::ValueMismatch { device, value } => {
                CommandError::InvalidValue { device, value }
            }
        }
    }
}

impl CommandError {
    /// Text spoken or shown to the user
    pub fn user_message(&self) -> String {
        match self {
            CommandError::LowConfidence(_) => {
                "Sorry, I didn't catch that clearly. Could you repeat please?".to_string()
            }
            CommandError::Unrecognized => {
                "Sorry, I didn't understand that command. Say 'help' for examples.".to_string()
            }
            CommandError::RoomNotFound(room) => {
                format!("Sorry, I couldn't find the {}.", room.display_name())
            }
            CommandError::DeviceNotFound { room, device } => {
                format!("Sorry, the {} doesn't have {}.", room.display_name(), device)
            }
            CommandError::InvalidValue { device, value } => {
                format!("Sorry, {} isn't a valid setting for the {}.", value, device)
            }
            CommandError::UnknownScene(name) => format!("Sorry, I don't know the {} scene.", name),
            CommandError::UnsupportedTimer(device) => {
                format!("Sorry, I can't set a timer for the {}.", device)
            }
            CommandError::BackendUnavailable(backend) => format!(
                "The {} backend isn't available. Make sure the server is running.",
                backend
            ),
        }
    }
}

//! Command module: from utterance to device changes
//!
//! - Orchestrator: confidence gate, parse, dispatch, confirm
//! - Settings: voice confirmation and transcription backend
//! - History: last ten processed utterances

mod error;
mod history;
mod orchestrator;
mod settings;

pub use error::CommandError;
pub use history::HistoryEntry;
pub use orchestrator::{CommandConfig, Orchestrator};
pub use settings::Settings;

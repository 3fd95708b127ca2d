//! Persistence backends for the device state store

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::store::Snapshot;

/// Where device state is loaded from and saved to.
///
/// `load` hands back raw JSON; the store validates it against the device
/// domains and falls back to defaults when it does not fit.
pub trait StateStorage: Send + Sync {
    /// Load the last saved state, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<serde_json::Value>>;

    /// Persist a full snapshot
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Pretty-printed JSON file in the data directory
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
        }
    }
}

impl StateStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<serde_json::Value>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let value = serde_json::from_slice(&bytes).context("state file is not valid JSON")?;
        Ok(Some(value))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("failed to create state directory")?;
        }

        // Write next to the target and rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, bytes).context("failed to write state file")?;
        std::fs::rename(&tmp, &self.path).context("failed to replace state file")?;

        debug!(path = %self.path.display(), "device state saved");
        Ok(())
    }
}

/// In-memory storage, keeps the last saved snapshot as JSON
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    saved: std::sync::Mutex<Option<serde_json::Value>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from previously saved JSON
    pub fn with_value(value: serde_json::Value) -> Self {
        Self {
            saved: std::sync::Mutex::new(Some(value)),
        }
    }

    /// Last saved JSON, if any
    pub fn saved(&self) -> Option<serde_json::Value> {
        self.saved.lock().ok().and_then(|saved| saved.clone())
    }
}

#[cfg(test)]
impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.saved())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot)?;
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        *saved = Some(value);
        Ok(())
    }
}

/// Storage whose saves always fail, as on a full or read-only disk
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FailingStorage;

#[cfg(test)]
impl StateStorage for FailingStorage {
    fn load(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<()> {
        anyhow::bail!("disk is read-only")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::default_snapshot;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(&dir.path().join("devices.json"));
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(&dir.path().join("nested").join("devices.json"));

        storage.save(&default_snapshot()).unwrap();
        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded["kitchen"]["security"], "disarmed");
        assert_eq!(loaded["living-room"]["thermostat"], 72);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(JsonFileStorage::new(&path).load().is_err());
    }
}

//! Device state module
//!
//! Provides the typed device model and the persisted state store:
//! - Room / Device: fixed vocabulary used as mapping keys
//! - DeviceValue: tagged union whose variants enforce each kind's domain
//! - DeviceStore: room → device → value, persisted after every write

mod device;
mod storage;
mod store;

pub use device::{Brightness, Device, DeviceValue, MusicState, Room, SecurityState};
pub use storage::JsonFileStorage;
pub use store::{DeviceStore, Snapshot, StoreError};

#[cfg(test)]
pub use storage::{FailingStorage, MemoryStorage};
#[cfg(test)]
pub use store::default_snapshot;

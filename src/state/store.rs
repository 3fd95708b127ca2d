//! Device state store
//!
//! Holds the room → device → value mapping. The set of rooms and the
//! devices each room owns are fixed once the store is built; writes to a
//! target that does not exist are rejected rather than created.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::device::{Brightness, Device, DeviceValue, MusicState, Room, SecurityState, ValueError};
use super::storage::StateStorage;

/// Full device state, ordered for stable persisted output
pub type Snapshot = BTreeMap<Room, BTreeMap<Device, DeviceValue>>;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(Room),

    #[error("{room} has no {device}")]
    DeviceNotFound { room: Room, device: Device },

    #[error("{value} is not a {device} value")]
    ValueMismatch { device: Device, value: DeviceValue },
}

/// Layout and values used when nothing usable was persisted
pub fn default_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert(
        Room::LivingRoom,
        BTreeMap::from([
            (Device::Lights, DeviceValue::Lights(Brightness::OFF)),
            (Device::Thermostat, DeviceValue::Thermostat(72)),
            (Device::Music, DeviceValue::Music(MusicState::Stopped)),
        ]),
    );
    snapshot.insert(
        Room::Bedroom,
        BTreeMap::from([
            (Device::Lights, DeviceValue::Lights(Brightness::OFF)),
            (Device::Thermostat, DeviceValue::Thermostat(70)),
        ]),
    );
    snapshot.insert(
        Room::Kitchen,
        BTreeMap::from([
            (Device::Lights, DeviceValue::Lights(Brightness::OFF)),
            (Device::Security, DeviceValue::Security(SecurityState::Disarmed)),
        ]),
    );
    snapshot
}

/// Why persisted state was rejected
#[derive(Debug, Error)]
enum LoadError {
    #[error("expected an object of rooms")]
    NotAnObject,

    #[error("no rooms in saved state")]
    Empty,

    #[error("unknown room {0:?}")]
    UnknownRoom(String),

    #[error("unknown device {device:?} in {room}")]
    UnknownDevice { room: Room, device: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}

fn parse_snapshot(value: &serde_json::Value) -> Result<Snapshot, LoadError> {
    let rooms = value.as_object().ok_or(LoadError::NotAnObject)?;
    if rooms.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut snapshot = Snapshot::new();
    for (room_id, devices) in rooms {
        let room = Room::from_id(room_id).ok_or_else(|| LoadError::UnknownRoom(room_id.clone()))?;
        let devices = devices.as_object().ok_or(LoadError::NotAnObject)?;

        let mut parsed = BTreeMap::new();
        for (name, raw) in devices {
            let device = serde_json::from_value::<Device>(serde_json::Value::String(name.clone()))
                .map_err(|_| LoadError::UnknownDevice {
                    room,
                    device: name.clone(),
                })?;
            parsed.insert(device, DeviceValue::from_json(device, raw)?);
        }
        snapshot.insert(room, parsed);
    }
    Ok(snapshot)
}

pub struct DeviceStore {
    devices: Snapshot,
    storage: Arc<dyn StateStorage>,
}

impl DeviceStore {
    /// Create a store over an explicit layout
    pub fn new(devices: Snapshot, storage: Arc<dyn StateStorage>) -> Self {
        Self { devices, storage }
    }

    /// Load persisted state, seeding defaults when it is absent or unusable
    pub fn load_or_default(storage: Arc<dyn StateStorage>) -> Self {
        let devices = match storage.load() {
            Ok(Some(value)) => match parse_snapshot(&value) {
                Ok(snapshot) => {
                    info!(rooms = snapshot.len(), "device state loaded");
                    snapshot
                }
                Err(e) => {
                    warn!(error = %e, "saved device state is malformed, using defaults");
                    default_snapshot()
                }
            },
            Ok(None) => {
                info!("no saved device state, using defaults");
                default_snapshot()
            }
            Err(e) => {
                warn!(error = %e, "failed to load device state, using defaults");
                default_snapshot()
            }
        };

        Self::new(devices, storage)
    }

    /// Check that a room exists and owns a device
    pub fn check(&self, room: Room, device: Device) -> Result<(), StoreError> {
        let devices = self.devices.get(&room).ok_or(StoreError::RoomNotFound(room))?;
        if devices.contains_key(&device) {
            Ok(())
        } else {
            Err(StoreError::DeviceNotFound { room, device })
        }
    }

    pub fn get(&self, room: Room, device: Device) -> Result<DeviceValue, StoreError> {
        self.devices
            .get(&room)
            .ok_or(StoreError::RoomNotFound(room))?
            .get(&device)
            .copied()
            .ok_or(StoreError::DeviceNotFound { room, device })
    }

    /// Write a value and persist the full snapshot before returning.
    ///
    /// Save failures are logged; the in-memory write still stands.
    pub fn set(&mut self, room: Room, device: Device, value: DeviceValue) -> Result<(), StoreError> {
        if value.device() != device {
            return Err(StoreError::ValueMismatch { device, value });
        }

        let slot = self
            .devices
            .get_mut(&room)
            .ok_or(StoreError::RoomNotFound(room))?
            .get_mut(&device)
            .ok_or(StoreError::DeviceNotFound { room, device })?;
        *slot = value;

        debug!(room = %room, device = %device, value = %value, "device updated");
        self.persist();
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.devices.clone()
    }

    /// Save the current state, logging instead of failing
    pub fn persist(&self) {
        if let Err(e) = self.storage.save(&self.devices) {
            warn!(error = %e, "failed to save device state");
        }
    }
}

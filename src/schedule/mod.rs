//! Deferred execution: scenes and timers
//!
//! Both run as spawned tasks tracked in a registry keyed by id, so any
//! pending step or timer can be inspected and cancelled before it fires.

mod registry;
mod scene;
mod timer;

pub use scene::{find_scene, SceneExecutor};
pub use timer::{TimerInfo, TimerManager};

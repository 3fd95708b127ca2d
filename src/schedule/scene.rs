//! Built-in scenes and their staggered execution
//!
//! Step `i` of a scene lands `step_delay × i` after the run starts, so
//! devices visibly switch one after another. Steps write the store
//! directly; a step whose target the store does not hold is logged and
//! skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use super::registry::TaskRegistry;
use crate::command::CommandError;
use crate::events::{EventSink, Feedback, HomeEvent};
use crate::state::{Brightness, Device, DeviceStore, DeviceValue, MusicState, Room, SecurityState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneStep {
    pub room: Room,
    pub device: Device,
    pub value: DeviceValue,
}

const fn step(room: Room, value: DeviceValue) -> SceneStep {
    SceneStep {
        room,
        device: value.device(),
        value,
    }
}

const fn lights(room: Room, level: i64) -> SceneStep {
    step(room, DeviceValue::Lights(Brightness::clamped(level)))
}

#[derive(Debug)]
pub struct Scene {
    pub name: &'static str,
    pub label: &'static str,
    pub steps: &'static [SceneStep],
}

pub const SCENES: &[Scene] = &[
    Scene {
        name: "movie",
        label: "Movie",
        steps: &[
            lights(Room::LivingRoom, 20),
            lights(Room::Kitchen, 0),
            step(Room::LivingRoom, DeviceValue::Music(MusicState::Stopped)),
            step(Room::LivingRoom, DeviceValue::Thermostat(70)),
        ],
    },
    Scene {
        name: "goodnight",
        label: "Goodnight",
        steps: &[
            lights(Room::LivingRoom, 0),
            lights(Room::Bedroom, 0),
            lights(Room::Kitchen, 0),
            step(Room::LivingRoom, DeviceValue::Music(MusicState::Stopped)),
            step(Room::Kitchen, DeviceValue::Security(SecurityState::Armed)),
        ],
    },
    Scene {
        name: "morning",
        label: "Morning",
        steps: &[
            lights(Room::Bedroom, 80),
            lights(Room::Kitchen, 100),
            step(Room::LivingRoom, DeviceValue::Thermostat(72)),
            step(Room::Kitchen, DeviceValue::Security(SecurityState::Disarmed)),
        ],
    },
    Scene {
        name: "party",
        label: "Party",
        steps: &[
            lights(Room::LivingRoom, 100),
            lights(Room::Kitchen, 100),
            step(Room::LivingRoom, DeviceValue::Music(MusicState::Playing)),
        ],
    },
];

pub fn find_scene(name: &str) -> Option<&'static Scene> {
    SCENES.iter().find(|scene| scene.name == name)
}

/// A scene run that has not finished yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneRun {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

pub struct SceneExecutor {
    store: Arc<RwLock<DeviceStore>>,
    events: EventSink,
    registry: TaskRegistry<SceneRun>,
    step_delay: Duration,
    runs: AtomicU64,
}

impl SceneExecutor {
    pub fn new(store: Arc<RwLock<DeviceStore>>, events: EventSink, step_delay: Duration) -> Self {
        Self {
            store,
            events,
            registry: TaskRegistry::new(),
            step_delay,
            runs: AtomicU64::new(0),
        }
    }

    /// Start a scene; steps and the final confirmation follow asynchronously
    pub async fn run(&self, name: &str) -> Result<SceneRun, CommandError> {
        let scene = find_scene(name).ok_or_else(|| CommandError::UnknownScene(name.to_string()))?;
        let run_number = self.runs.fetch_add(1, Ordering::Relaxed) + 1;

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let registry = self.registry.clone();
        let step_delay = self.step_delay;

        let run = self
            .registry
            .spawn(&format!("scene-{}-{}", scene.name, run_number), move |id| {
                let run = SceneRun {
                    id: id.clone(),
                    name: scene.name.to_string(),
                    started_at: Utc::now(),
                };
                let task = async move {
                    let start = Instant::now();
                    for (index, step) in scene.steps.iter().enumerate() {
                        sleep_until(start + step_delay * index as u32).await;
                        apply_step(&store, &events, step).await;
                    }

                    registry.take(&id).await;
                    info!(scene = scene.name, "scene complete");
                    events.emit(HomeEvent::SceneCompleted {
                        id,
                        name: scene.name.to_string(),
                    });
                    events.feedback(&Feedback::success(format!("{} mode activated", scene.label)));
                };
                (run, task)
            })
            .await;

        info!(scene = scene.name, id = %run.id, steps = scene.steps.len(), "scene started");
        self.events.emit(HomeEvent::SceneStarted {
            id: run.id.clone(),
            name: run.name.clone(),
        });
        Ok(run)
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.registry.contains(id).await
    }

    /// Stop a run before its remaining steps apply
    pub async fn cancel(&self, id: &str) -> bool {
        self.registry.cancel(id).await.is_some()
    }

    pub async fn abort_all(&self) -> usize {
        self.registry.abort_all().await
    }
}

async fn apply_step(store: &RwLock<DeviceStore>, events: &EventSink, step: &SceneStep) {
    let result = store.write().await.set(step.room, step.device, step.value);
    match result {
        Ok(()) => events.emit(HomeEvent::DeviceChanged {
            room: step.room,
            device: step.device,
            value: step.value,
        }),
        Err(e) => warn!(error = %e, "skipping scene step"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{default_snapshot, MemoryStorage};
    use tokio::sync::broadcast;

    fn executor() -> (SceneExecutor, Arc<RwLock<DeviceStore>>, broadcast::Receiver<HomeEvent>) {
        let store = Arc::new(RwLock::new(DeviceStore::load_or_default(Arc::new(
            MemoryStorage::new(),
        ))));
        let (tx, rx) = broadcast::channel(64);
        let executor = SceneExecutor::new(
            Arc::clone(&store),
            EventSink::new(tx, false),
            Duration::from_millis(500),
        );
        (executor, store, rx)
    }

    #[test]
    fn test_scene_steps_target_default_layout() {
        let layout = default_snapshot();
        for scene in SCENES {
            for step in scene.steps {
                assert!(
                    layout.get(&step.room).is_some_and(|devices| devices.contains_key(&step.device)),
                    "{} step {:?} has no target",
                    scene.name,
                    step
                );
                assert_eq!(step.value.device(), step.device);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_goodnight_turns_everything_off() {
        let (executor, store, _rx) = executor();
        for room in Room::ALL {
            store
                .write()
                .await
                .set(room, Device::Lights, DeviceValue::Lights(Brightness::FULL))
                .unwrap();
        }

        let run = executor.run("goodnight").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500 * 5)).await;

        let store = store.read().await;
        for room in Room::ALL {
            assert_eq!(
                store.get(room, Device::Lights),
                Ok(DeviceValue::Lights(Brightness::OFF))
            );
        }
        assert_eq!(
            store.get(Room::Kitchen, Device::Security),
            Ok(DeviceValue::Security(SecurityState::Armed))
        );
        assert!(!executor.is_running(&run.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_are_staggered() {
        let (executor, store, _rx) = executor();

        executor.run("party").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        {
            let store = store.read().await;
            assert_eq!(
                store.get(Room::LivingRoom, Device::Lights),
                Ok(DeviceValue::Lights(Brightness::FULL))
            );
            assert_eq!(
                store.get(Room::Kitchen, Device::Lights),
                Ok(DeviceValue::Lights(Brightness::OFF))
            );
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            store.read().await.get(Room::Kitchen, Device::Lights),
            Ok(DeviceValue::Lights(Brightness::FULL))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_confirmation_after_last_step() {
        let (executor, _store, mut rx) = executor();

        executor.run("morning").await.unwrap();
        let mut last_feedback = None;
        while let Ok(event) = rx.recv().await {
            if let HomeEvent::Feedback { text, .. } = &event {
                last_feedback = Some(text.clone());
            }
            if matches!(event, HomeEvent::SceneCompleted { .. }) {
                break;
            }
        }
        assert!(last_feedback.is_none());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HomeEvent::Feedback { ref text, .. } if text == "Morning mode activated"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_scene() {
        let (executor, store, _rx) = executor();
        let before = store.read().await.snapshot();

        let result = executor.run("disco").await;

        assert_eq!(result, Err(CommandError::UnknownScene("disco".to_string())));
        assert_eq!(store.read().await.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scene_stops_midway() {
        let (executor, store, _rx) = executor();

        let run = executor.run("party").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(executor.cancel(&run.id).await);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let store = store.read().await;
        assert_eq!(
            store.get(Room::LivingRoom, Device::Lights),
            Ok(DeviceValue::Lights(Brightness::FULL))
        );
        assert_eq!(
            store.get(Room::Kitchen, Device::Lights),
            Ok(DeviceValue::Lights(Brightness::OFF))
        );
    }
}

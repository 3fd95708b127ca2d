//! Deferred "turn it off later" timers
//!
//! A timer sets one device to its off value once its duration elapses.
//! Timers on the same room and device are independent by default: both
//! fire and the later one writes last. With `replace_pending` set, a new
//! timer cancels whatever was pending on that target first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::registry::TaskRegistry;
use crate::command::CommandError;
use crate::events::{EventSink, Feedback, HomeEvent};
use crate::intent::TimeUnit;
use crate::state::{Device, DeviceStore, DeviceValue, Room};

/// Snapshot of a pending timer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerInfo {
    pub id: String,
    pub room: Room,
    pub device: Device,
    pub action: String,
    pub end_time: DateTime<Utc>,
    pub duration: u32,
    pub unit: TimeUnit,
}

impl TimerInfo {
    /// Time left until the timer fires, zero once it is due
    pub fn remaining(&self) -> Duration {
        (self.end_time - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

pub struct TimerManager {
    store: Arc<RwLock<DeviceStore>>,
    events: EventSink,
    registry: TaskRegistry<TimerInfo>,
    replace_pending: bool,
    /// Never reused, so a stale id cannot reach a newer timer
    sequence: AtomicU64,
}

impl TimerManager {
    pub fn new(store: Arc<RwLock<DeviceStore>>, events: EventSink, replace_pending: bool) -> Self {
        Self {
            store,
            events,
            registry: TaskRegistry::new(),
            replace_pending,
            sequence: AtomicU64::new(0),
        }
    }

    /// Schedule `device` in `room` to switch off after `duration` `unit`s
    pub async fn schedule(
        &self,
        room: Room,
        device: Device,
        action: &str,
        duration: u32,
        unit: TimeUnit,
    ) -> Result<TimerInfo, CommandError> {
        let off = device
            .off_value()
            .ok_or(CommandError::UnsupportedTimer(device))?;
        self.store.read().await.check(room, device)?;

        if self.replace_pending {
            for replaced in self
                .registry
                .cancel_where(|timer| timer.room == room && timer.device == device)
                .await
            {
                info!(id = %replaced.id, "replacing pending timer");
                self.events.emit(HomeEvent::TimerCancelled { id: replaced.id });
            }
        }

        let delay = Duration::from_millis(u64::from(duration) * unit.millis());
        let created = Utc::now();
        let end_time = created
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let registry = self.registry.clone();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let base_id = format!(
            "{}-{}-{}-{}",
            room,
            device,
            created.timestamp_millis(),
            sequence
        );

        let timer = self
            .registry
            .spawn(&base_id, move |id| {
                let timer = TimerInfo {
                    id,
                    room,
                    device,
                    action: action.to_string(),
                    end_time,
                    duration,
                    unit,
                };
                let fired = timer.clone();
                let task = async move {
                    tokio::time::sleep(delay).await;
                    if registry.take(&fired.id).await.is_none() {
                        return;
                    }
                    fire(&store, &events, &fired, off).await;
                };
                (timer, task)
            })
            .await;

        info!(
            id = %timer.id,
            room = %room,
            device = %device,
            delay_ms = delay.as_millis() as u64,
            "timer scheduled"
        );
        self.events.emit(HomeEvent::TimerScheduled {
            timer: timer.clone(),
        });
        Ok(timer)
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.registry.contains(id).await
    }

    /// Pending timers, soonest first
    pub async fn active(&self) -> Vec<TimerInfo> {
        let mut timers = self.registry.list().await;
        timers.sort_by(|a, b| a.end_time.cmp(&b.end_time).then_with(|| a.id.cmp(&b.id)));
        timers
    }

    /// Cancel a pending timer; false if it already fired or never existed
    pub async fn cancel(&self, id: &str) -> bool {
        match self.registry.cancel(id).await {
            Some(timer) => {
                info!(id = %timer.id, "timer cancelled");
                self.events.emit(HomeEvent::TimerCancelled { id: timer.id });
                true
            }
            None => false,
        }
    }

    pub async fn abort_all(&self) -> usize {
        self.registry.abort_all().await
    }
}

async fn fire(store: &RwLock<DeviceStore>, events: &EventSink, timer: &TimerInfo, off: DeviceValue) {
    let result = store.write().await.set(timer.room, timer.device, off);
    if let Err(e) = result {
        warn!(id = %timer.id, error = %e, "timer target vanished");
        return;
    }

    info!(id = %timer.id, "timer fired");
    events.emit(HomeEvent::DeviceChanged {
        room: timer.room,
        device: timer.device,
        value: off,
    });
    events.emit(HomeEvent::TimerFired {
        id: timer.id.clone(),
    });

    let done = match off {
        DeviceValue::Music(state) => state.as_str(),
        DeviceValue::Security(state) => state.as_str(),
        _ => "turned off",
    };
    events.feedback(&Feedback::success(format!(
        "Timer complete: {} {} {}",
        timer.room.display_name(),
        timer.device,
        done
    )));
}

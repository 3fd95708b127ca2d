//! Command orchestration
//!
//! Takes one transcribed utterance at a time: rejects it when the
//! recognizer was unsure, parses it, routes the intent to the store,
//! scenes, timers or settings, and answers with confirmation text.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::history::{CommandHistory, HistoryEntry};
use super::settings::{Settings, SettingsHandler};
use super::CommandError;
use crate::events::{EventSink, Feedback, HomeEvent};
use crate::intent::{DeviceAction, DeviceCommand, Intent, Parser, RoomNormalizer};
use crate::schedule::{find_scene, SceneExecutor, TimerInfo, TimerManager};
use crate::state::{DeviceStore, DeviceValue, Room, Snapshot};
use crate::transcribe::BackendHealth;

/// Tunables for command handling
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Reported confidence below this is rejected
    pub confidence_threshold: f32,
    /// Room used when an utterance names none
    pub default_room: Room,
    /// Simulated device latency, picked uniformly from this range
    pub response_delay_min: Duration,
    pub response_delay_max: Duration,
    /// Gap between consecutive scene steps
    pub scene_step_delay: Duration,
    /// New timers cancel pending ones on the same device
    pub replace_pending_timers: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            default_room: Room::LivingRoom,
            response_delay_min: Duration::from_millis(200),
            response_delay_max: Duration::from_millis(700),
            scene_step_delay: Duration::from_millis(500),
            replace_pending_timers: false,
        }
    }
}

const UNRECOGNIZED: &[&str] = &[
    "Sorry, I didn't understand that command. Say 'help' for examples.",
    "I'm not sure what you mean. Could you rephrase that?",
    "Hmm, I don't know how to do that yet.",
    "I didn't hear a command in that. Try 'turn on the living room lights'.",
];

const HELP: &str = "You can say things like: 'turn on the living room lights', \
'dim bedroom lights to 50 percent', 'set the thermostat to 70', 'play music', \
'arm the security system', 'movie mode', 'goodnight', \
'turn off kitchen lights in 10 minutes', or 'disable voice feedback'.";

pub struct Orchestrator {
    config: CommandConfig,
    parser: Parser,
    store: Arc<RwLock<DeviceStore>>,
    scenes: SceneExecutor,
    timers: TimerManager,
    settings: SettingsHandler,
    history: Mutex<CommandHistory>,
    events: EventSink,
    rng: Mutex<StdRng>,
}

impl Orchestrator {
    pub fn new(
        config: CommandConfig,
        store: DeviceStore,
        events: EventSink,
        health: Arc<dyn BackendHealth>,
    ) -> Self {
        let store = Arc::new(RwLock::new(store));
        let scenes = SceneExecutor::new(Arc::clone(&store), events.clone(), config.scene_step_delay);
        let timers = TimerManager::new(
            Arc::clone(&store),
            events.clone(),
            config.replace_pending_timers,
        );

        Self {
            parser: Parser::new(RoomNormalizer::new(config.default_room)),
            scenes,
            timers,
            settings: SettingsHandler::new(events.clone(), health),
            history: Mutex::new(CommandHistory::default()),
            rng: Mutex::new(StdRng::from_entropy()),
            store,
            events,
            config,
        }
    }

    /// Replace the random source, for reproducible replies
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Handle one utterance. `None` or a non-finite confidence means the
    /// recognizer did not report one and is never rejected on that basis.
    pub async fn handle(&self, utterance: &str, confidence: Option<f32>) -> Feedback {
        let confidence = confidence.filter(|c| c.is_finite()).unwrap_or(1.0);
        if confidence < self.config.confidence_threshold && confidence < 1.0 {
            info!(utterance, confidence, "low confidence, asking to repeat");
            let feedback = Feedback::error(CommandError::LowConfidence(confidence).user_message());
            self.events.feedback(&feedback);
            return feedback;
        }

        let Some((rule, intent)) = self.parser.parse_with_rule(utterance) else {
            info!(utterance, "unrecognized command");
            let feedback = Feedback::error(self.unrecognized_reply().await);
            self.events.feedback(&feedback);
            self.record(utterance, None, false).await;
            return feedback;
        };

        debug!(rule, ?intent, "dispatching intent");
        let result = self.dispatch(&intent).await;
        let success = result.is_ok();
        let feedback = match result {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(utterance, error = %e, "command failed");
                Feedback::error(e.user_message())
            }
        };

        self.events.feedback(&feedback);
        self.record(utterance, Some(intent), success).await;
        feedback
    }

    async fn dispatch(&self, intent: &Intent) -> Result<Feedback, CommandError> {
        match intent {
            Intent::Help => Ok(Feedback::normal(HELP)),
            Intent::Device(command) => self.run_device_command(command).await,
            Intent::Scene { name } => {
                let run = self.scenes.run(name).await?;
                let label = find_scene(&run.name).map_or(name.as_str(), |scene| scene.label);
                Ok(Feedback::normal(format!("Activating {} mode...", label)))
            }
            Intent::Timer(timer) => {
                let scheduled = self
                    .timers
                    .schedule(timer.room, timer.device, &timer.action, timer.duration, timer.unit)
                    .await?;
                Ok(Feedback::success(format!(
                    "Timer set: {} {} will {} in {} {}",
                    scheduled.room.display_name(),
                    scheduled.device,
                    scheduled.action,
                    scheduled.duration,
                    scheduled.unit.label(scheduled.duration)
                )))
            }
            Intent::Settings { action } => self.settings.apply(*action).await,
        }
    }

    async fn run_device_command(&self, command: &DeviceCommand) -> Result<Feedback, CommandError> {
        self.store.read().await.check(command.room, command.device)?;

        let delay = self.response_delay().await;
        debug!(delay_ms = delay.as_millis() as u64, "simulating device latency");
        tokio::time::sleep(delay).await;

        self.store
            .write()
            .await
            .set(command.room, command.device, command.value)?;
        info!(
            room = %command.room,
            device = %command.device,
            value = %command.value,
            "device command applied"
        );
        self.events.emit(HomeEvent::DeviceChanged {
            room: command.room,
            device: command.device,
            value: command.value,
        });

        Ok(Feedback::success(format!("OK, {}", confirmation(command))))
    }

    async fn response_delay(&self) -> Duration {
        let min = self.config.response_delay_min.as_millis() as u64;
        let max = self.config.response_delay_max.as_millis() as u64;
        let (low, high) = (min.min(max), min.max(max));
        Duration::from_millis(self.rng.lock().await.gen_range(low..=high))
    }

    async fn unrecognized_reply(&self) -> String {
        let mut rng = self.rng.lock().await;
        UNRECOGNIZED
            .choose(&mut *rng)
            .map(|reply| reply.to_string())
            .unwrap_or_else(|| CommandError::Unrecognized.user_message())
    }

    async fn record(&self, utterance: &str, intent: Option<Intent>, success: bool) {
        let entry = self.history.lock().await.record(utterance, intent, success);
        self.events.emit(HomeEvent::CommandProcessed { entry });
    }

    pub async fn devices(&self) -> Snapshot {
        self.store.read().await.snapshot()
    }

    pub async fn timers(&self) -> Vec<TimerInfo> {
        self.timers.active().await
    }

    pub async fn cancel_timer(&self, id: &str) -> bool {
        self.timers.cancel(id).await
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.entries()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.current().await
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Abort pending scenes and timers and flush the store
    pub async fn shutdown(&self) {
        let scenes = self.scenes.abort_all().await;
        let timers = self.timers.abort_all().await;
        info!(scenes, timers, "pending tasks aborted");
        self.store.read().await.persist();
    }
}

/// Natural-language description of an applied device command
fn confirmation(command: &DeviceCommand) -> String {
    let room = command.room.display_name();
    match command.value {
        DeviceValue::Lights(level) => match command.action {
            DeviceAction::On => format!("{} lights turned on", room),
            DeviceAction::Off => format!("{} lights turned off", room),
            _ if level.percent() == 0 => format!("{} lights turned off", room),
            _ => format!("{} lights dimmed to {}%", room, level.percent()),
        },
        DeviceValue::Thermostat(degrees) => {
            format!("{} thermostat set to {} degrees", room, degrees)
        }
        DeviceValue::Music(state) => format!("{} music {}", room, state.as_str()),
        DeviceValue::Security(state) => format!("{} security system {}", room, state.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FeedbackKind;
    use crate::state::{Brightness, Device, FailingStorage, MemoryStorage, SecurityState};
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    struct Offline;

    #[async_trait]
    impl BackendHealth for Offline {
        async fn is_available(&self) -> bool {
            false
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<MemoryStorage>, broadcast::Receiver<HomeEvent>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = DeviceStore::load_or_default(storage.clone());
        let (tx, rx) = broadcast::channel(256);
        let orchestrator = Orchestrator::new(
            CommandConfig::default(),
            store,
            EventSink::new(tx, true),
            Arc::new(Offline),
        )
        .with_rng(StdRng::seed_from_u64(7));
        (orchestrator, storage, rx)
    }

    async fn device(orchestrator: &Orchestrator, room: Room, device: Device) -> Option<DeviceValue> {
        orchestrator
            .devices()
            .await
            .get(&room)
            .and_then(|devices| devices.get(&device))
            .copied()
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_on_living_room_lights() {
        let (orchestrator, storage, _rx) = orchestrator();

        let feedback = orchestrator.handle("turn on living room lights", Some(1.0)).await;

        assert_eq!(feedback.kind, FeedbackKind::Success);
        assert!(feedback.text.contains("living room lights turned on"));
        assert_eq!(
            device(&orchestrator, Room::LivingRoom, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::FULL))
        );
        assert_eq!(storage.saved().unwrap()["living-room"]["lights"], 100);

        let history = orchestrator.history().await;
        assert!(history[0].success);
        assert!(matches!(history[0].intent, Some(Intent::Device(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_change_waits_for_latency() {
        let (orchestrator, _storage, _rx) = orchestrator();
        let orchestrator = Arc::new(orchestrator);

        let handle = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.handle("turn on kitchen lights", None).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            device(&orchestrator, Room::Kitchen, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::OFF))
        );

        handle.await.unwrap();
        assert_eq!(
            device(&orchestrator, Room::Kitchen, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::FULL))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dim_bedroom_lights() {
        let (orchestrator, _storage, _rx) = orchestrator();

        let feedback = orchestrator
            .handle("dim bedroom lights to 50 percent", Some(0.92))
            .await;

        assert!(feedback.text.contains("bedroom lights dimmed to 50%"));
        assert_eq!(
            device(&orchestrator, Room::Bedroom, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::clamped(50)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_is_rejected() {
        let (orchestrator, storage, mut rx) = orchestrator();
        let before = orchestrator.devices().await;

        let feedback = orchestrator.handle("turn on living room lights", Some(0.4)).await;

        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert!(feedback.text.contains("repeat"));
        assert_eq!(orchestrator.devices().await, before);
        assert!(storage.saved().is_none());
        assert!(orchestrator.history().await.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            HomeEvent::Feedback { speak: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_edge_and_unknown_confidence() {
        let (orchestrator, _storage, _rx) = orchestrator();

        let feedback = orchestrator.handle("lights on", Some(0.7)).await;
        assert_eq!(feedback.kind, FeedbackKind::Success);

        let feedback = orchestrator.handle("lights off", None).await;
        assert_eq!(feedback.kind, FeedbackKind::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_finite_confidence_counts_as_unreported() {
        let (orchestrator, _storage, _rx) = orchestrator();

        for confidence in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let feedback = orchestrator.handle("lights on", Some(confidence)).await;
            assert_eq!(feedback.kind, FeedbackKind::Success);
        }
        assert_eq!(orchestrator.history().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_still_confirms() {
        let (tx, _rx) = broadcast::channel(64);
        let orchestrator = Orchestrator::new(
            CommandConfig::default(),
            DeviceStore::load_or_default(Arc::new(FailingStorage)),
            EventSink::new(tx, false),
            Arc::new(Offline),
        );

        let feedback = orchestrator.handle("turn on the bedroom lights", None).await;

        assert_eq!(feedback.kind, FeedbackKind::Success);
        assert_eq!(
            device(&orchestrator, Room::Bedroom, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::FULL))
        );
        assert!(orchestrator.history().await[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_records_failure() {
        let (orchestrator, _storage, _rx) = orchestrator();

        let feedback = orchestrator.handle("sing me a song about cheese", None).await;

        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert!(UNRECOGNIZED.contains(&feedback.text.as_str()));
        let history = orchestrator.history().await;
        assert!(!history[0].success);
        assert!(history[0].intent.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_is_reported() {
        let (orchestrator, storage, _rx) = orchestrator();

        let feedback = orchestrator.handle("play music in the kitchen", None).await;

        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert_eq!(feedback.text, "Sorry, the kitchen doesn't have music.");
        assert!(storage.saved().is_none());
        assert!(!orchestrator.history().await[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_goodnight_scene() {
        let (orchestrator, _storage, _rx) = orchestrator();
        orchestrator.handle("turn on the lights in the bedroom", None).await;

        let feedback = orchestrator.handle("goodnight", None).await;
        assert_eq!(feedback.text, "Activating Goodnight mode...");

        tokio::time::sleep(Duration::from_secs(3)).await;
        for room in Room::ALL {
            assert_eq!(
                device(&orchestrator, room, Device::Lights).await,
                Some(DeviceValue::Lights(Brightness::OFF))
            );
        }
        assert_eq!(
            device(&orchestrator, Room::Kitchen, Device::Security).await,
            Some(DeviceValue::Security(SecurityState::Armed))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_command() {
        let (orchestrator, _storage, _rx) = orchestrator();
        orchestrator.handle("turn on living room lights", None).await;

        let feedback = orchestrator
            .handle("turn off living room lights in 10 minutes", None)
            .await;
        assert_eq!(
            feedback.text,
            "Timer set: living room lights will turn off in 10 minutes"
        );
        assert_eq!(orchestrator.timers().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(
            device(&orchestrator, Room::LivingRoom, Device::Lights).await,
            Some(DeviceValue::Lights(Brightness::OFF))
        );
        assert!(orchestrator.timers().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_timer() {
        let (orchestrator, _storage, _rx) = orchestrator();
        orchestrator.handle("stop the music in 5 minutes", None).await;

        let id = orchestrator.timers().await[0].id.clone();
        assert!(orchestrator.cancel_timer(&id).await);
        assert!(orchestrator.timers().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_switch_without_service() {
        let (orchestrator, _storage, _rx) = orchestrator();

        let feedback = orchestrator.handle("switch to whisper backend", None).await;

        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert!(feedback.text.contains("isn't available"));
        assert_eq!(
            orchestrator.settings().await.backend,
            crate::transcribe::Backend::Browser
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_bounded() {
        let (orchestrator, _storage, _rx) = orchestrator();
        for _ in 0..12 {
            orchestrator.handle("help", None).await;
        }
        assert_eq!(orchestrator.history().await.len(), 10);
    }

    #[test]
    fn test_confirmation_wording() {
        let command = DeviceCommand {
            device: Device::Thermostat,
            room: Room::Bedroom,
            action: DeviceAction::Set,
            value: DeviceValue::Thermostat(68),
        };
        assert_eq!(confirmation(&command), "bedroom thermostat set to 68 degrees");

        let command = DeviceCommand {
            device: Device::Security,
            room: Room::Kitchen,
            action: DeviceAction::Arm,
            value: DeviceValue::Security(SecurityState::Armed),
        };
        assert_eq!(confirmation(&command), "kitchen security system armed");
    }
}

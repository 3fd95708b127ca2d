//! smart-home-voiced: command engine for a voice-driven smart home
//!
//! The daemon takes transcribed utterances (or raw audio for the offline
//! Whisper backend) over a Unix socket and provides:
//! - Ordered rule-table parsing of spoken commands
//! - A persisted device state store for three rooms
//! - Staggered scenes and cancellable "turn off in N minutes" timers
//! - Feedback and state events pushed to subscribed clients
//!
//! Speech capture and synthesis stay in the client.

mod command;
mod config;
mod events;
mod intent;
mod ipc;
mod lifecycle;
mod schedule;
mod state;
mod transcribe;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::command::Orchestrator;
use crate::config::Config;
use crate::events::{EventSink, HomeEvent};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::state::{DeviceStore, JsonFileStorage};
use crate::transcribe::WhisperClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "smart-home-voiced starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        ?config.state_path,
        whisper_url = %config.whisper_url,
        "configuration loaded"
    );

    let shutdown = ShutdownSignal::new();

    // Engine -> IPC subscribers and the event log
    let (event_tx, _) = broadcast::channel::<HomeEvent>(256);
    let events = EventSink::new(event_tx, true);

    let storage = Arc::new(JsonFileStorage::new(&config.state_path));
    let store = DeviceStore::load_or_default(storage);

    let whisper = Arc::new(
        WhisperClient::new(&config.whisper_url, config.http_timeout)
            .context("failed to build transcription client")?,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        config.command.clone(),
        store,
        events.clone(),
        whisper.clone(),
    ));

    let server = Server::new(&config.socket_path, Arc::clone(&orchestrator), whisper)?;

    let mut event_rx = events.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep a log of everything the engine reports
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(HomeEvent::Feedback { text, kind, .. }) => {
                        info!(?kind, %text, "feedback");
                    }
                    Ok(event) => {
                        debug!(%event, "home event");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event log lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("event log exited");
        }

        // Wait for shutdown signal
        reason = shutdown.wait() => {
            info!(%reason, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    orchestrator.shutdown().await;
    server.shutdown().await;

    info!("smart-home-voiced stopped");

    Ok(())
}

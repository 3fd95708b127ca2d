//! Unix domain socket server for IPC
//!
//! Provides request-response communication for utterances and queries,
//! and pushes `HomeEvent`s to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::command::Orchestrator;
use crate::events::{Feedback, HomeEvent};
use crate::transcribe::{TranscriptionStatus, WhisperClient};

use super::protocol::{DaemonStatus, Request, Response};

/// Largest accepted frame, audio included
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Sample rate assumed when an audio request does not carry one
const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// What every connection handler needs
struct ServerContext {
    orchestrator: Arc<Orchestrator>,
    whisper: Arc<WhisperClient>,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        orchestrator: Arc<Orchestrator>,
        whisper: Arc<WhisperClient>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: Arc::new(ServerContext {
                orchestrator,
                whisper,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(mut stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
        loop {
            let Some(request) = Self::read_request(&mut stream).await? else {
                debug!("client disconnected");
                return Ok(());
            };
            debug!(?request, "received request");

            if request == Request::Subscribe {
                let events = context.orchestrator.events().subscribe();
                Self::send_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to events");
                return Self::push_events(stream, events).await;
            }

            let response = Self::process_request(request, &context).await;
            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Read one length-prefixed request; `None` on a clean disconnect
    async fn read_request(stream: &mut UnixStream) -> Result<Option<Request>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        let mut msg_buf = vec![0u8; len];
        stream.read_exact(&mut msg_buf).await?;

        let request = serde_json::from_slice(&msg_buf).context("failed to parse request")?;
        Ok(Some(request))
    }

    /// Forward events until the client goes away or the channel closes
    async fn push_events(
        mut stream: UnixStream,
        mut events: broadcast::Receiver<HomeEvent>,
    ) -> Result<()> {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::send_message(&mut stream, &Response::Event { event }).await {
                        debug!(?e, "subscriber disconnected");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(request: Request, context: &ServerContext) -> Response {
        let orchestrator = &context.orchestrator;
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: context.start_time.elapsed().as_secs(),
                settings: orchestrator.settings().await,
                active_timers: orchestrator.timers().await.len(),
            }),

            Request::Utterance { text, confidence } => {
                Response::Feedback(orchestrator.handle(&text, confidence).await)
            }

            Request::Audio { data, sample_rate } => {
                Self::process_audio(&data, sample_rate, context).await
            }

            Request::GetDevices => Response::Devices {
                devices: orchestrator.devices().await,
            },

            Request::GetTimers => Response::Timers {
                timers: orchestrator.timers().await,
            },

            Request::CancelTimer { id } => {
                let cancelled = orchestrator.cancel_timer(&id).await;
                Response::TimerCancelled { id, cancelled }
            }

            Request::GetHistory => Response::History {
                entries: orchestrator.history().await,
            },

            Request::GetModels => match context.whisper.models().await {
                Ok(models) => Response::Models(models),
                Err(e) => {
                    warn!(error = %e, "failed to list whisper models");
                    Response::error("whisper_unavailable", e.to_string())
                }
            },

            Request::SwitchModel { model } => match context.whisper.switch_model(model).await {
                Ok(switch) => Response::ModelSwitched {
                    model: switch.model.unwrap_or(model),
                    message: switch.message,
                },
                Err(e) => {
                    warn!(error = %e, %model, "failed to switch whisper model");
                    Response::error("model_switch_failed", e.to_string())
                }
            },

            // Handled by the connection loop before dispatch
            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Transcribe audio with Whisper, then handle the text as an utterance
    async fn process_audio(data: &str, sample_rate: Option<u32>, context: &ServerContext) -> Response {
        let audio = match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(audio) => audio,
            Err(e) => return Response::error("invalid_audio", e.to_string()),
        };
        let sample_rate = sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

        let transcription = match context.whisper.transcribe(audio, sample_rate).await {
            Ok(transcription) => transcription,
            Err(e) => {
                warn!(error = %e, "transcription failed");
                return Response::error("transcription_failed", e.to_string());
            }
        };

        if transcription.status == TranscriptionStatus::NoSpeechDetected
            || transcription.text.trim().is_empty()
        {
            return Response::Feedback(Feedback::normal("No speech detected"));
        }

        info!(
            text = %transcription.text,
            confidence = transcription.confidence,
            "audio transcribed"
        );
        Response::Feedback(
            context
                .orchestrator
                .handle(&transcription.text, Some(transcription.confidence))
                .await,
        )
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

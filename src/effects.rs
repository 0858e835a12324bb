//! Effect runner for voxlink
//!
//! This module handles executing effects produced by the state machine:
//! microphone capture via the audio thread, level gating + scratch
//! persistence, and the streaming upload to the agent server. Completion
//! events are sent back via the provided channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{self, AudioService, Clip, ScratchStore};
use crate::config::Config;
use crate::state_machine::{Effect, Event};
use crate::upload::{AgentClient, UploadError, UploadProgress};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Production effect runner: real microphone, real scratch file, real
/// agent server.
pub struct DeviceEffectRunner {
    audio: AudioService,
    scratch: Arc<ScratchStore>,
    client: Arc<AgentClient>,
    min_record: Duration,
    max_record: Duration,
}

impl DeviceEffectRunner {
    pub fn new(
        config: &Config,
        audio: AudioService,
        scratch: Arc<ScratchStore>,
        client: Arc<AgentClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            audio,
            scratch,
            client,
            min_record: Duration::from_millis(config.min_record_ms),
            max_record: config.max_record_duration(),
        })
    }

    /// Gate a stopped clip (duration + levels) and persist it to scratch.
    /// Returns the event to feed back into the reducer.
    fn gate_and_persist(scratch: &ScratchStore, id: Uuid, clip: Clip, min_record: Duration) -> Event {
        let duration = clip.duration();
        if duration < min_record {
            log::info!(
                "Rejecting clip: too short ({:?} < {:?})",
                duration,
                min_record
            );
            return Event::ValidationFail {
                id,
                reason: format!(
                    "Recording too short: {}ms (minimum {}ms)",
                    duration.as_millis(),
                    min_record.as_millis()
                ),
            };
        }

        if let Err(e) = audio::levels::validate(&clip.samples) {
            log::info!("Rejecting clip: {}", e);
            return Event::ValidationFail {
                id,
                reason: e.to_string(),
            };
        }

        match scratch.write_recording(&clip.samples, clip.sample_rate) {
            Ok(bytes) => Event::PersistOk {
                id,
                path: scratch.path().to_path_buf(),
                bytes,
            },
            Err(e) => {
                log::error!("Failed to persist recording: {}", e);
                Event::CaptureFail {
                    id,
                    err: e.to_string(),
                }
            }
        }
    }
}

impl EffectRunner for DeviceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::Probe => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    match client.probe().await {
                        Ok(reply) => {
                            log::debug!("Probe reply: {}", reply.body);
                            let _ = tx
                                .send(Event::ProbeOk {
                                    status: reply.status,
                                })
                                .await;
                        }
                        Err(e) => {
                            let _ = tx.send(Event::ProbeFail { err: e.to_string() }).await;
                        }
                    }
                });
            }

            Effect::StartCapture { id } => {
                let audio = self.audio.clone();
                let max_record = self.max_record;
                tokio::spawn(async move {
                    match audio.start_capture(max_record).await {
                        Ok(()) => {
                            let _ = tx.send(Event::CaptureStartOk { id }).await;
                        }
                        Err(e) => {
                            log::error!("Failed to start capture: {}", e);
                            let _ = tx
                                .send(Event::CaptureStartFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::FinishCapture { id } => {
                let audio = self.audio.clone();
                let scratch = self.scratch.clone();
                let min_record = self.min_record;
                tokio::spawn(async move {
                    let clip = match audio.stop_capture().await {
                        Ok(clip) => clip,
                        Err(e) => {
                            log::error!("Failed to stop capture: {}", e);
                            let _ = tx
                                .send(Event::CaptureFail {
                                    id,
                                    err: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    };

                    // Scratch write is synchronous file IO.
                    let event = tokio::task::spawn_blocking(move || {
                        Self::gate_and_persist(&scratch, id, clip, min_record)
                    })
                    .await
                    .unwrap_or_else(|e| Event::CaptureFail {
                        id,
                        err: format!("persist task failed: {}", e),
                    });

                    let _ = tx.send(event).await;
                });
            }

            Effect::StartUpload { id, path } => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let (progress_tx, mut progress_rx) = mpsc::channel::<UploadProgress>(64);

                    // Forward chunk progress into the state machine.
                    let progress_events = tx.clone();
                    let forwarder = tokio::spawn(async move {
                        let mut last_percent = None;
                        while let Some(report) = progress_rx.recv().await {
                            if last_percent == Some(report.percent) {
                                continue;
                            }
                            last_percent = Some(report.percent);
                            if progress_events
                                .send(Event::UploadProgress {
                                    id,
                                    percent: report.percent,
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    });

                    let result = client.upload(&path, progress_tx).await;
                    let _ = forwarder.await;

                    match result {
                        Ok(reply) => {
                            let _ = tx
                                .send(Event::UploadOk {
                                    id,
                                    reply: reply.body,
                                })
                                .await;
                        }
                        Err(e) => {
                            log::error!("Upload failed: {}", e);
                            let offline = matches!(e, UploadError::TransportUnavailable);
                            let _ = tx
                                .send(Event::UploadFail {
                                    id,
                                    err: e.to_string(),
                                    offline,
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::StartRecordingTick { id } => {
                let max_record = self.max_record;
                tokio::spawn(async move {
                    // Tick once a second for the lifetime of the longest
                    // possible recording; the reducer drops stale ticks.
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    interval.tick().await;
                    for _ in 0..=max_record.as_secs() {
                        interval.tick().await;
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::StartResultTimeout { id, duration } => {
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    log::debug!("Result timeout elapsed for id={}", id);
                    let _ = tx.send(Event::ResultTimeout { id }).await;
                });
            }

            Effect::EmitStatus => {
                // Handled in the main loop, not here
                unreachable!("EmitStatus should be handled in run_state_loop");
            }
        }
    }
}

/// Scripted effect runner that simulates a happy path, for loop-level tests
/// and demos without hardware or a server.
pub struct StubEffectRunner;

impl StubEffectRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::Probe => {
                tokio::spawn(async move {
                    let _ = tx.send(Event::ProbeOk { status: 200 }).await;
                });
            }

            Effect::StartCapture { id } => {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let _ = tx.send(Event::CaptureStartOk { id }).await;
                });
            }

            Effect::FinishCapture { id } => {
                tokio::spawn(async move {
                    let _ = tx
                        .send(Event::PersistOk {
                            id,
                            path: std::path::PathBuf::from("/tmp/voxlink-stub.wav"),
                            bytes: 32_000,
                        })
                        .await;
                });
            }

            Effect::StartUpload { id, .. } => {
                tokio::spawn(async move {
                    for percent in [25u8, 50, 75, 100] {
                        let _ = tx.send(Event::UploadProgress { id, percent }).await;
                    }
                    let _ = tx
                        .send(Event::UploadOk {
                            id,
                            reply: "[Simulated agent reply]".to_string(),
                        })
                        .await;
                });
            }

            Effect::StartRecordingTick { id } => {
                tokio::spawn(async move {
                    for _ in 0..5 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        if tx.send(Event::RecordingTick { id }).await.is_err() {
                            break;
                        }
                    }
                });
            }

            Effect::StartResultTimeout { id, duration } => {
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let _ = tx.send(Event::ResultTimeout { id }).await;
                });
            }

            Effect::EmitStatus => {
                unreachable!("EmitStatus should be handled in run_state_loop");
            }
        }
    }
}

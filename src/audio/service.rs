//! Dedicated audio thread
//!
//! `cpal::Stream` is not `Send`, so the recorder and any active capture
//! handle live on one dedicated thread. Async callers talk to it over a
//! command channel and get replies on oneshot channels.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::recorder::{AudioError, AudioRecorder, CaptureHandle, Clip};

enum AudioCmd {
    Start {
        max_duration: Duration,
        reply: oneshot::Sender<Result<(), AudioError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<Clip, AudioError>>,
    },
}

/// Handle to the audio thread. Cloneable; dropping all handles shuts the
/// thread down.
#[derive(Clone)]
pub struct AudioService {
    cmd_tx: mpsc::UnboundedSender<AudioCmd>,
}

impl AudioService {
    /// Spawn the audio thread. The recorder itself is created lazily on the
    /// first capture so a missing microphone surfaces at record time, not
    /// at startup.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("voxlink-audio".to_string())
            .spawn(move || audio_thread(cmd_rx))
            .expect("failed to spawn audio thread");

        Self { cmd_tx }
    }

    /// Start a capture bounded to `max_duration`.
    pub async fn start_capture(&self, max_duration: Duration) -> Result<(), AudioError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(AudioCmd::Start {
                max_duration,
                reply,
            })
            .map_err(|_| AudioError::StreamCreationFailed("audio thread gone".to_string()))?;
        rx.await
            .unwrap_or_else(|_| Err(AudioError::StreamCreationFailed("audio thread gone".to_string())))
    }

    /// Stop the active capture and take the clip.
    pub async fn stop_capture(&self) -> Result<Clip, AudioError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(AudioCmd::Stop { reply })
            .map_err(|_| AudioError::StreamCreationFailed("audio thread gone".to_string()))?;
        rx.await
            .unwrap_or_else(|_| Err(AudioError::StreamCreationFailed("audio thread gone".to_string())))
    }
}

fn audio_thread(mut cmd_rx: mpsc::UnboundedReceiver<AudioCmd>) {
    let mut recorder: Option<AudioRecorder> = None;
    let mut active: Option<CaptureHandle> = None;

    log::debug!("Audio thread started");

    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            AudioCmd::Start { max_duration, reply } => {
                if active.is_some() {
                    log::warn!("Capture already active, ignoring duplicate start");
                    let _ = reply.send(Ok(()));
                    continue;
                }

                if recorder.is_none() {
                    // Retry creation each time so a plugged-in mic is
                    // picked up without restarting.
                    match AudioRecorder::new() {
                        Ok(r) => recorder = Some(r),
                        Err(e) => {
                            log::error!("Failed to initialize audio recorder: {}", e);
                            let _ = reply.send(Err(e));
                            continue;
                        }
                    }
                }

                let result = match recorder.as_ref() {
                    Some(rec) => rec.start(max_duration).map(|handle| {
                        active = Some(handle);
                    }),
                    None => Err(AudioError::NoInputDevice),
                };
                let _ = reply.send(result);
            }
            AudioCmd::Stop { reply } => {
                let result = match active.take() {
                    Some(handle) => Ok(handle.stop()),
                    None => Err(AudioError::NoActiveCapture),
                };
                let _ = reply.send(result);
            }
        }
    }

    log::debug!("Audio thread stopped");
}

//! State machine for voxlink
//!
//! This module implements the core state machine using a single-writer
//! pattern. All state transitions go through the `reduce()` function, which
//! returns a new state and a list of effects to execute.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Reducer limits resolved from the startup config.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Recording auto-stops once it reaches this length.
    pub max_record: Duration,
    /// How long a successful reply stays visible before returning to idle.
    pub result_display: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_record: Duration::from_secs(5),
            result_display: Duration::from_secs(3),
        }
    }
}

/// Internal state of the record/upload workflow.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub enum State {
    /// Startup connectivity probe in flight.
    Connecting,
    Idle,
    /// Capture requested, waiting for the microphone to come up.
    Arming {
        recording_id: Uuid,
    },
    Recording {
        recording_id: Uuid,
        started_at: Instant,
    },
    /// Capture stopped; validating levels and persisting to scratch.
    Processing {
        recording_id: Uuid,
    },
    Uploading {
        recording_id: Uuid,
        percent: u8,
    },
    Done {
        recording_id: Uuid,
        reply: String,
    },
    /// Terminal until acknowledged. `offline` routes the acknowledgment
    /// back through the connectivity probe instead of straight to idle.
    Error {
        message: String,
        offline: bool,
    },
}

impl Default for State {
    fn default() -> Self {
        State::Connecting
    }
}

/// Events that can trigger state transitions.
/// Sent from the input task, effect runner, and timers.
#[derive(Debug, Clone)]
pub enum Event {
    /// Kick off the startup probe.
    Startup,
    /// Application exit requested (handled at the loop edge).
    Exit,
    /// User pressed the record button (toggle start/stop).
    ButtonToggle,
    /// User acknowledged a terminal error.
    Acknowledge,

    // Connectivity events
    ProbeOk {
        status: u16,
    },
    ProbeFail {
        err: String,
    },

    // Capture events
    CaptureStartOk {
        id: Uuid,
    },
    CaptureStartFail {
        id: Uuid,
        err: String,
    },
    /// Clip validated and written to the scratch file.
    PersistOk {
        id: Uuid,
        path: PathBuf,
        bytes: u64,
    },
    /// Capture stop or scratch write failed.
    CaptureFail {
        id: Uuid,
        err: String,
    },
    /// Clip rejected by the level/duration gate before upload.
    ValidationFail {
        id: Uuid,
        reason: String,
    },

    // Upload events
    UploadProgress {
        id: Uuid,
        percent: u8,
    },
    UploadOk {
        id: Uuid,
        reply: String,
    },
    UploadFail {
        id: Uuid,
        err: String,
        offline: bool,
    },

    /// Tick while recording (includes id to prevent stale ticks).
    RecordingTick {
        id: Uuid,
    },
    /// Done state auto-dismiss timeout (includes id to prevent stale timeouts).
    ResultTimeout {
        id: Uuid,
    },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    Probe,
    StartCapture {
        id: Uuid,
    },
    /// Stop the capture, gate it, and persist to the scratch file.
    FinishCapture {
        id: Uuid,
    },
    StartUpload {
        id: Uuid,
        path: PathBuf,
    },
    /// Start sending RecordingTick events every second while recording.
    StartRecordingTick {
        id: Uuid,
    },
    StartResultTimeout {
        id: Uuid,
        duration: Duration,
    },
    /// Signal to push the current status to the feedback layer.
    EmitStatus,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale recording IDs
/// - Always emit status after state changes
pub fn reduce(state: &State, event: Event, limits: &Limits) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    // Helper: extract current recording_id (if any)
    let current_id: Option<Uuid> = match state {
        Connecting | Idle | Error { .. } => None,
        Arming { recording_id } => Some(*recording_id),
        Recording { recording_id, .. } => Some(*recording_id),
        Processing { recording_id } => Some(*recording_id),
        Uploading { recording_id, .. } => Some(*recording_id),
        Done { recording_id, .. } => Some(*recording_id),
    };

    // Helper: check if event's ID is stale (doesn't match current workflow)
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Connecting
        // -----------------
        (Connecting, Startup) => (Connecting, vec![Probe, EmitStatus]),
        (Connecting, ProbeOk { status }) => {
            log::info!("Connected to agent server (status {})", status);
            (Idle, vec![EmitStatus])
        }
        (Connecting, ProbeFail { err }) => (
            Error {
                message: err,
                offline: true,
            },
            vec![EmitStatus],
        ),

        // -----------------
        // Idle
        // -----------------
        (Idle, ButtonToggle) => {
            let id = Uuid::new_v4();
            (
                Arming { recording_id: id },
                vec![StartCapture { id }, EmitStatus],
            )
        }
        (Idle, Acknowledge) => (Idle, vec![]),

        // -----------------
        // Arming
        // -----------------
        (Arming { recording_id }, CaptureStartOk { id }) if *recording_id == id => (
            Recording {
                recording_id: id,
                started_at: Instant::now(),
            },
            vec![StartRecordingTick { id }, EmitStatus],
        ),
        (Arming { recording_id }, CaptureStartFail { id, err }) if *recording_id == id => (
            Error {
                message: err,
                offline: false,
            },
            vec![EmitStatus],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording { recording_id, .. },
            ButtonToggle,
        ) => (
            Processing {
                recording_id: *recording_id,
            },
            vec![FinishCapture { id: *recording_id }, EmitStatus],
        ),
        // Tick during recording - refresh the display and enforce the
        // max-duration bound.
        (
            Recording {
                recording_id,
                started_at,
            },
            RecordingTick { id },
        ) if *recording_id == id => {
            let elapsed = started_at.elapsed();
            if elapsed >= limits.max_record {
                log::info!(
                    "Recording {} auto-stopped after {:?} (max duration reached)",
                    recording_id,
                    elapsed
                );
                (
                    Processing {
                        recording_id: *recording_id,
                    },
                    vec![FinishCapture { id: *recording_id }, EmitStatus],
                )
            } else {
                (state.clone(), vec![EmitStatus])
            }
        }

        // -----------------
        // Processing
        // -----------------
        (Processing { recording_id }, PersistOk { id, path, bytes }) if *recording_id == id => {
            log::info!("Scratch recording ready: {:?} ({} bytes)", path, bytes);
            (
                Uploading {
                    recording_id: id,
                    percent: 0,
                },
                vec![StartUpload { id, path }, EmitStatus],
            )
        }
        (Processing { recording_id }, ValidationFail { id, reason }) if *recording_id == id => (
            Error {
                message: reason,
                offline: false,
            },
            vec![EmitStatus],
        ),
        (Processing { recording_id }, CaptureFail { id, err }) if *recording_id == id => (
            Error {
                message: err,
                offline: false,
            },
            vec![EmitStatus],
        ),

        // -----------------
        // Uploading
        // -----------------
        (Uploading { recording_id, .. }, UploadProgress { id, percent }) if *recording_id == id => (
            Uploading {
                recording_id: id,
                percent,
            },
            vec![EmitStatus],
        ),
        (Uploading { recording_id, .. }, UploadOk { id, reply }) if *recording_id == id => (
            Done {
                recording_id: id,
                reply,
            },
            vec![
                StartResultTimeout {
                    id,
                    duration: limits.result_display,
                },
                EmitStatus,
            ],
        ),
        (Uploading { recording_id, .. }, UploadFail { id, err, offline }) if *recording_id == id => {
            (
                Error {
                    message: err,
                    offline,
                },
                vec![EmitStatus],
            )
        }

        // -----------------
        // Done
        // -----------------
        // Only handle ResultTimeout if id matches current recording
        // (prevents stale timeouts).
        (Done { recording_id, .. }, ResultTimeout { id }) if *recording_id == id => {
            (Idle, vec![EmitStatus])
        }
        (Done { .. }, ResultTimeout { .. }) => (state.clone(), vec![]),
        (Done { .. }, ButtonToggle) => {
            // Start a new recording immediately
            let id = Uuid::new_v4();
            (
                Arming { recording_id: id },
                vec![StartCapture { id }, EmitStatus],
            )
        }

        // -----------------
        // Error (terminal until acknowledged)
        // -----------------
        (Error { offline: true, .. }, Acknowledge) => (Connecting, vec![Probe, EmitStatus]),
        (Error { offline: false, .. }, Acknowledge) => (Idle, vec![EmitStatus]),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, CaptureStartOk { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureStartFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, PersistOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, ValidationFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, UploadProgress { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, UploadOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, UploadFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, RecordingTick { id }) if is_stale(id) => (state.clone(), vec![]),
        (_, ResultTimeout { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

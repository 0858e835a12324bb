//! voxlink - push-to-talk voice client for an agent server
//!
//! Records a short clip from the microphone, gates it on amplitude, writes
//! it to a single scratch WAV file, and streams it to the agent server as
//! multipart form-data with a precomputed Content-Length. The server's
//! reply is surfaced through the console and an LED blink pattern.
//!
//! Architecture: a single-writer state machine (`state_machine::reduce`)
//! owns all workflow state. Input, timers, and effect completions arrive as
//! events on one channel; effects fan out through the `EffectRunner`.

pub mod audio;
pub mod config;
pub mod effects;
pub mod feedback;
pub mod input;
pub mod state_machine;
pub mod upload;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioService, ScratchStore};
use crate::config::Config;
use crate::effects::{DeviceEffectRunner, EffectRunner};
use crate::feedback::{run_led_driver, ConsoleSink, LogLed, Status, StatusSink};
use crate::input::{run_input_task, StdinButtons};
use crate::state_machine::{reduce, Effect, Event, Limits, State};
use crate::upload::AgentClient;

/// Capacity of the central event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Map a workflow state onto its user-visible status.
pub fn status_for_state(state: &State) -> Status {
    match state {
        State::Connecting => Status::Connecting,
        State::Idle => Status::Idle,
        State::Arming { .. } => Status::Recording { elapsed_secs: 0 },
        State::Recording { started_at, .. } => Status::Recording {
            elapsed_secs: started_at.elapsed().as_secs(),
        },
        // Capture stopped, upload not started: show 0% rather than a
        // phantom extra phase.
        State::Processing { .. } => Status::Sending { percent: 0 },
        State::Uploading { percent, .. } => Status::Sending { percent: *percent },
        State::Done { reply, .. } => Status::Success {
            reply: reply.clone(),
        },
        State::Error { message, .. } => Status::Error {
            message: message.clone(),
        },
    }
}

fn state_name(state: &State) -> &'static str {
    match state {
        State::Connecting => "Connecting",
        State::Idle => "Idle",
        State::Arming { .. } => "Arming",
        State::Recording { .. } => "Recording",
        State::Processing { .. } => "Processing",
        State::Uploading { .. } => "Uploading",
        State::Done { .. } => "Done",
        State::Error { .. } => "Error",
    }
}

/// Single-writer event loop. Owns the state, runs the reducer, dispatches
/// effects, and pushes status updates. Returns when `Event::Exit` arrives
/// or the event channel closes.
pub async fn run_state_loop(
    runner: Arc<dyn EffectRunner>,
    mut sink: impl StatusSink,
    status_tx: watch::Sender<Status>,
    event_tx: mpsc::Sender<Event>,
    mut event_rx: mpsc::Receiver<Event>,
    limits: Limits,
) {
    let mut state = State::default();

    while let Some(event) = event_rx.recv().await {
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, stopping state loop");
            break;
        }

        log::trace!("Event: {:?}", event);
        let (next, effects) = reduce(&state, event, &limits);

        if std::mem::discriminant(&next) != std::mem::discriminant(&state) {
            log::debug!("State: {} -> {}", state_name(&state), state_name(&next));
        }
        state = next;

        for effect in effects {
            match effect {
                Effect::EmitStatus => {
                    let status = status_for_state(&state);
                    sink.update(&status);
                    let _ = status_tx.send(status);
                }
                other => runner.spawn(other, event_tx.clone()),
            }
        }
    }
}

/// Run the full application: config, audio thread, HTTP client, input and
/// LED tasks, and the state loop, until the user quits or stdin closes.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    log::info!(
        "Starting voxlink: server {}, agent {}",
        config.server_url,
        config.agent_name
    );

    let scratch = Arc::new(ScratchStore::new(&config.scratch_file_name)?);
    let client = Arc::new(AgentClient::new(&config));
    let audio = AudioService::spawn();

    let limits = Limits {
        max_record: config.max_record_duration(),
        result_display: config.result_display(),
    };

    let runner = DeviceEffectRunner::new(&config, audio, scratch, client);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (status_tx, status_rx) = watch::channel(Status::Connecting);
    let cancel = CancellationToken::new();

    let input_task = tokio::spawn(run_input_task(
        StdinButtons::new(),
        event_tx.clone(),
        cancel.clone(),
    ));
    let led_task = tokio::spawn(run_led_driver(status_rx, LogLed::new(), cancel.clone()));

    // Seed the startup probe.
    let _ = event_tx.send(Event::Startup).await;

    run_state_loop(
        runner,
        ConsoleSink,
        status_tx,
        event_tx,
        event_rx,
        limits,
    )
    .await;

    cancel.cancel();
    let _ = led_task.await;
    input_task.abort();

    log::info!("voxlink stopped");
    Ok(())
}

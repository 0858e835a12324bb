//! Status and feedback layer
//!
//! Maps the workflow's discrete states onto user-visible side effects: a
//! console display line and an LED blink pattern. The blink logic is an
//! explicit finite-state object advanced by time deltas, so it can be
//! driven by any clock and tested deterministically.

use serde::Serialize;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// User-visible status, one value per workflow phase.
/// Tagged union format: { "status": "idle" } or
/// { "status": "sending", "percent": 42 }.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Status {
    Idle,
    Connecting,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Sending {
        percent: u8,
    },
    Success {
        reply: String,
    },
    Error {
        message: String,
    },
}

/// Output sink for status updates. Purely one-way; implementations render
/// and return nothing.
pub trait StatusSink: Send {
    fn update(&mut self, status: &Status);
}

/// Renders status lines to the terminal.
pub struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn update(&mut self, status: &Status) {
        match status {
            Status::Idle => println!("Ready. Press Enter to record."),
            Status::Connecting => println!("Connecting to agent server..."),
            Status::Recording { elapsed_secs } => {
                println!("Recording... {}s (Enter to stop)", elapsed_secs)
            }
            Status::Sending { percent } => println!("Uploading... {}%", percent),
            Status::Success { reply } => println!("Agent: {}", reply),
            Status::Error { message } => {
                println!("ERROR: {}", message);
                println!("Press 'a' + Enter to acknowledge.");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LED patterns
// ---------------------------------------------------------------------------

/// Blink cadences, one per status. Burst patterns toggle a fixed number of
/// times, then hold the LED off for a pause before repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    Off,
    Solid,
    /// Steady toggle with the given half-period.
    Blink { half_period_ms: u64 },
    /// `toggles` flips at `toggle_ms` intervals, then `pause_ms` dark.
    Burst {
        toggles: u8,
        toggle_ms: u64,
        pause_ms: u64,
    },
}

impl BlinkPattern {
    pub fn for_status(status: &Status) -> Self {
        match status {
            Status::Idle => BlinkPattern::Off,
            Status::Connecting => BlinkPattern::Blink {
                half_period_ms: 1000,
            },
            Status::Recording { .. } => BlinkPattern::Blink {
                half_period_ms: 200,
            },
            Status::Sending { .. } => BlinkPattern::Burst {
                toggles: 4,
                toggle_ms: 100,
                pause_ms: 300,
            },
            Status::Success { .. } => BlinkPattern::Solid,
            Status::Error { .. } => BlinkPattern::Burst {
                toggles: 6,
                toggle_ms: 100,
                pause_ms: 400,
            },
        }
    }
}

/// Explicit blink state machine: owns the LED level and phase position,
/// advanced only by `tick()` calls with explicit deltas.
#[derive(Debug)]
pub struct LedPattern {
    pattern: BlinkPattern,
    led_on: bool,
    in_step: Duration,
    toggles_done: u8,
    in_pause: bool,
}

impl LedPattern {
    pub fn new(pattern: BlinkPattern) -> Self {
        let led_on = matches!(pattern, BlinkPattern::Solid);
        Self {
            pattern,
            led_on,
            in_step: Duration::ZERO,
            toggles_done: 0,
            in_pause: false,
        }
    }

    /// Switch cadence, resetting phase.
    pub fn set(&mut self, pattern: BlinkPattern) {
        if pattern != self.pattern {
            *self = LedPattern::new(pattern);
        }
    }

    pub fn is_on(&self) -> bool {
        self.led_on
    }

    /// Advance by `delta` and return the resulting LED level.
    pub fn tick(&mut self, delta: Duration) -> bool {
        match self.pattern {
            BlinkPattern::Off => {
                self.led_on = false;
            }
            BlinkPattern::Solid => {
                self.led_on = true;
            }
            BlinkPattern::Blink { half_period_ms } => {
                self.in_step += delta;
                let step = Duration::from_millis(half_period_ms);
                while self.in_step >= step {
                    self.in_step -= step;
                    self.led_on = !self.led_on;
                }
            }
            BlinkPattern::Burst {
                toggles,
                toggle_ms,
                pause_ms,
            } => {
                self.in_step += delta;
                loop {
                    let step = if self.in_pause {
                        Duration::from_millis(pause_ms)
                    } else {
                        Duration::from_millis(toggle_ms)
                    };
                    if self.in_step < step {
                        break;
                    }
                    self.in_step -= step;
                    if self.in_pause {
                        self.in_pause = false;
                        self.toggles_done = 0;
                    } else {
                        self.led_on = !self.led_on;
                        self.toggles_done += 1;
                        if self.toggles_done >= toggles {
                            self.led_on = false;
                            self.in_pause = true;
                        }
                    }
                }
            }
        }
        self.led_on
    }
}

/// Hardware-ish LED output. The default implementation just traces level
/// changes; a board port would flip a GPIO here.
pub trait LedSink: Send {
    fn set(&mut self, on: bool);
}

/// Logs LED level changes at trace level.
pub struct LogLed {
    last: Option<bool>,
}

impl LogLed {
    pub fn new() -> Self {
        Self { last: None }
    }
}

impl Default for LogLed {
    fn default() -> Self {
        Self::new()
    }
}

impl LedSink for LogLed {
    fn set(&mut self, on: bool) {
        if self.last != Some(on) {
            log::trace!("LED {}", if on { "on" } else { "off" });
            self.last = Some(on);
        }
    }
}

const LED_TICK: Duration = Duration::from_millis(25);

/// Drive an LED sink from status updates until cancelled.
pub async fn run_led_driver(
    mut status_rx: watch::Receiver<Status>,
    mut led: impl LedSink,
    cancel: CancellationToken,
) {
    let mut pattern = LedPattern::new(BlinkPattern::for_status(&status_rx.borrow().clone()));
    let mut interval = tokio::time::interval(LED_TICK);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                pattern.set(BlinkPattern::for_status(&status));
                led.set(pattern.is_on());
            }
            _ = interval.tick() => {
                led.set(pattern.tick(LED_TICK));
            }
        }
    }

    led.set(false);
    log::debug!("LED driver stopped");
}

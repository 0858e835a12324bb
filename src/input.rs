//! Input capability for the main loop
//!
//! The record button is modeled as an explicit input source the loop waits
//! on, rather than a hardware object baked into the loop itself. The stock
//! implementation reads lines from stdin: bare Enter toggles recording,
//! "a" acknowledges an error, "q" quits.

use std::future::Future;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::state_machine::Event;

/// A discrete user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Toggle,
    Acknowledge,
    Quit,
}

/// Source of button events. `next()` resolves with `None` once the source
/// is exhausted.
pub trait ButtonInput: Send + 'static {
    fn next(&mut self) -> impl Future<Output = Option<ButtonEvent>> + Send;
}

/// Line-oriented input on stdin.
pub struct StdinButtons {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinButtons {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinButtons {
    fn default() -> Self {
        Self::new()
    }
}

impl ButtonInput for StdinButtons {
    async fn next(&mut self) -> Option<ButtonEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse_line(&line) {
                        return Some(event);
                    }
                    log::debug!("Ignoring input line: {:?}", line);
                }
                Ok(None) => return None,
                Err(e) => {
                    log::warn!("Input read error: {}", e);
                    return None;
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<ButtonEvent> {
    match line.trim() {
        "" => Some(ButtonEvent::Toggle),
        "a" | "ack" => Some(ButtonEvent::Acknowledge),
        "q" | "quit" | "exit" => Some(ButtonEvent::Quit),
        _ => None,
    }
}

/// Forward button events into the state machine until the source closes or
/// the app shuts down.
pub async fn run_input_task(
    mut input: impl ButtonInput,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    loop {
        let button = tokio::select! {
            _ = cancel.cancelled() => break,
            button = input.next() => button,
        };

        let Some(button) = button else {
            log::info!("Input source closed, requesting exit");
            let _ = tx.send(Event::Exit).await;
            break;
        };

        let event = match button {
            ButtonEvent::Toggle => Event::ButtonToggle,
            ButtonEvent::Acknowledge => Event::Acknowledge,
            ButtonEvent::Quit => Event::Exit,
        };

        if tx.send(event).await.is_err() {
            break;
        }
    }

    log::debug!("Input task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_toggles_recording() {
        assert_eq!(parse_line(""), Some(ButtonEvent::Toggle));
        assert_eq!(parse_line("   "), Some(ButtonEvent::Toggle));
    }

    #[test]
    fn ack_and_quit_aliases() {
        assert_eq!(parse_line("a"), Some(ButtonEvent::Acknowledge));
        assert_eq!(parse_line("ack"), Some(ButtonEvent::Acknowledge));
        assert_eq!(parse_line("q"), Some(ButtonEvent::Quit));
        assert_eq!(parse_line("quit"), Some(ButtonEvent::Quit));
        assert_eq!(parse_line("exit"), Some(ButtonEvent::Quit));
    }

    #[test]
    fn unknown_lines_are_ignored() {
        assert_eq!(parse_line("hello"), None);
    }

    #[tokio::test]
    async fn input_task_translates_and_forwards_events() {
        struct Scripted(Vec<ButtonEvent>);
        impl ButtonInput for Scripted {
            async fn next(&mut self) -> Option<ButtonEvent> {
                if self.0.is_empty() {
                    None
                } else {
                    Some(self.0.remove(0))
                }
            }
        }

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        run_input_task(
            Scripted(vec![ButtonEvent::Toggle, ButtonEvent::Acknowledge]),
            tx,
            cancel,
        )
        .await;

        assert!(matches!(rx.recv().await, Some(Event::ButtonToggle)));
        assert!(matches!(rx.recv().await, Some(Event::Acknowledge)));
        // Source exhausted: exit is requested
        assert!(matches!(rx.recv().await, Some(Event::Exit)));
    }
}

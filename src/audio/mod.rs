//! Audio capture module for voxlink
//!
//! Microphone capture into a bounded mono buffer, amplitude validation, and
//! the single scratch WAV file that mirrors the latest clip on disk.
//! Uses CPAL for capture and hound for WAV encoding.

pub mod levels;
pub mod recorder;
pub mod scratch;
pub mod service;

pub use levels::{LevelError, LevelStats};
pub use recorder::{AudioError, AudioRecorder, CaptureHandle, Clip};
pub use scratch::{ScratchError, ScratchStore};
pub use service::AudioService;

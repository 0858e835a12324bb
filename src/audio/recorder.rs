//! Audio recorder using CPAL for microphone capture
//!
//! The AudioRecorder captures from the default input device into a bounded
//! in-memory sample buffer. Frames are downmixed to mono i16 as they arrive;
//! the buffer stops growing once the maximum clip length is reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};

/// Errors that can occur during audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    NoActiveCapture,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::NoActiveCapture => write!(f, "No capture in progress"),
        }
    }
}

impl std::error::Error for AudioError {}

/// A finished mono clip together with its sample rate.
#[derive(Debug, Clone)]
pub struct Clip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Handle to an active capture. `stop()` halts the stream and yields the clip.
pub struct CaptureHandle {
    _stream: Stream,
    buffer: Arc<Mutex<Vec<i16>>>,
    is_recording: Arc<AtomicBool>,
    sample_rate: u32,
}

impl CaptureHandle {
    /// Stop capturing and take the recorded clip.
    pub fn stop(self) -> Clip {
        self.is_recording.store(false, Ordering::SeqCst);

        let samples = {
            let mut guard = self.buffer.lock().unwrap();
            std::mem::take(&mut *guard)
        };

        log::info!(
            "Capture stopped: {} samples at {} Hz",
            samples.len(),
            self.sample_rate
        );

        Clip {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

/// Audio recorder that captures from the default input device.
pub struct AudioRecorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl AudioRecorder {
    /// Create a new AudioRecorder using the default input device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Start capturing, bounded to `max_duration` worth of samples.
    /// Returns a handle that must be used to stop the capture.
    pub fn start(&self, max_duration: Duration) -> Result<CaptureHandle, AudioError> {
        let sample_rate = self.sample_rate();
        let max_samples = (sample_rate as u64).saturating_mul(max_duration.as_secs()) as usize;

        let buffer = Arc::new(Mutex::new(Vec::with_capacity(max_samples)));
        let is_recording = Arc::new(AtomicBool::new(true));

        let stream = self.build_stream(buffer.clone(), is_recording.clone(), max_samples)?;

        stream.play().map_err(|e| {
            AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e))
        })?;

        log::info!("Capture started (max {} samples)", max_samples);

        Ok(CaptureHandle {
            _stream: stream,
            buffer,
            is_recording,
            sample_rate,
        })
    }

    fn build_stream(
        &self,
        buffer: Arc<Mutex<Vec<i16>>>,
        is_recording: Arc<AtomicBool>,
        max_samples: usize,
    ) -> Result<Stream, AudioError> {
        let err_fn = |err| log::error!("Audio stream error: {}", err);

        match self.sample_format {
            SampleFormat::I16 => {
                self.build_stream_typed::<i16>(buffer, is_recording, max_samples, err_fn)
            }
            SampleFormat::U16 => {
                self.build_stream_typed::<u16>(buffer, is_recording, max_samples, err_fn)
            }
            SampleFormat::F32 => {
                self.build_stream_typed::<f32>(buffer, is_recording, max_samples, err_fn)
            }
            _ => Err(AudioError::NoSupportedConfig),
        }
    }

    fn build_stream_typed<T>(
        &self,
        buffer: Arc<Mutex<Vec<i16>>>,
        is_recording: Arc<AtomicBool>,
        max_samples: usize,
        err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
    ) -> Result<Stream, AudioError>
    where
        T: cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let config = self.config.clone();
        let channels = config.channels as usize;

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !is_recording.load(Ordering::SeqCst) {
                        return;
                    }

                    let mut guard = buffer.lock().unwrap();
                    for frame in data.chunks(channels.max(1)) {
                        if guard.len() >= max_samples {
                            // Clip is full; keep the stream alive but drop
                            // further frames until stop() is called.
                            return;
                        }
                        guard.push(downmix_frame(frame));
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        Ok(stream)
    }
}

/// Average one interleaved frame down to a single mono i16 sample.
fn downmix_frame<T>(frame: &[T]) -> i16
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    use cpal::FromSample;

    if frame.is_empty() {
        return 0;
    }
    let mut sum = 0.0f32;
    for &sample in frame {
        sum += f32::from_sample_(sample);
    }
    let mixed = sum / frame.len() as f32;
    let clamped = mixed.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

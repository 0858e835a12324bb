//! Scratch storage for the most recent recording
//!
//! A single reusable WAV file holds whatever was recorded last; each new
//! recording overwrites it. There is no history and no per-recording naming.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

/// Errors from scratch-file operations.
#[derive(Debug, Clone)]
pub enum ScratchError {
    DirCreationFailed(String),
    WriteFailed(String),
    NotFound(String),
}

impl std::fmt::Display for ScratchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScratchError::DirCreationFailed(e) => {
                write!(f, "Failed to create scratch directory: {}", e)
            }
            ScratchError::WriteFailed(e) => write!(f, "Failed to write scratch file: {}", e),
            ScratchError::NotFound(e) => write!(f, "Scratch file unavailable: {}", e),
        }
    }
}

impl std::error::Error for ScratchError {}

/// The single named scratch file on local storage.
pub struct ScratchStore {
    path: PathBuf,
}

impl ScratchStore {
    /// Scratch store under the local data directory:
    /// `~/.local/share/voxlink/<file_name>`.
    pub fn new(file_name: &str) -> Result<Self, ScratchError> {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxlink");
        Self::in_dir(&dir, file_name)
    }

    /// Scratch store rooted at an explicit directory (used by tests).
    pub fn in_dir(dir: &Path, file_name: &str) -> Result<Self, ScratchError> {
        fs::create_dir_all(dir).map_err(|e| ScratchError::DirCreationFailed(e.to_string()))?;
        Ok(Self {
            path: dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a mono 16-bit clip as WAV, replacing any previous recording.
    /// Returns the size of the finished file in bytes.
    pub fn write_recording(&self, samples: &[i16], sample_rate: u32) -> Result<u64, ScratchError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(&self.path, spec)
            .map_err(|e| ScratchError::WriteFailed(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| ScratchError::WriteFailed(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| ScratchError::WriteFailed(e.to_string()))?;

        let size = self.size()?;
        log::info!("Scratch file written: {:?} ({} bytes)", self.path, size);
        Ok(size)
    }

    /// Byte length of the current scratch file.
    pub fn size(&self) -> Result<u64, ScratchError> {
        fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| ScratchError::NotFound(e.to_string()))
    }

    /// Remove the scratch file if present.
    pub fn remove(&self) -> Result<(), ScratchError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScratchError::WriteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_overwrites_previous_recording() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::in_dir(dir.path(), "recording.wav").unwrap();

        let long = vec![1000i16; 16_000];
        let first = store.write_recording(&long, 16_000).unwrap();

        let short = vec![1000i16; 4_000];
        let second = store.write_recording(&short, 16_000).unwrap();

        assert!(second < first);
        assert_eq!(store.size().unwrap(), second);
    }

    #[test]
    fn written_file_round_trips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::in_dir(dir.path(), "recording.wav").unwrap();

        let samples: Vec<i16> = (0..100).map(|i| i as i16 * 10).collect();
        store.write_recording(&samples, 16_000).unwrap();

        let mut reader = hound::WavReader::open(store.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn size_fails_when_nothing_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::in_dir(dir.path(), "recording.wav").unwrap();
        assert!(matches!(
            store.size().unwrap_err(),
            ScratchError::NotFound(_)
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::in_dir(dir.path(), "recording.wav").unwrap();
        store.write_recording(&[1, 2, 3], 16_000).unwrap();
        store.remove().unwrap();
        store.remove().unwrap();
        assert!(store.size().is_err());
    }
}

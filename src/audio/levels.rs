//! Amplitude sanity check for captured clips
//!
//! A clip has to look like plausible microphone audio before it is worth
//! uploading: not near-silence, not clipped against full scale.

/// Minimum average absolute amplitude; quieter clips are treated as silence.
const MIN_AVERAGE_LEVEL: i32 = 50;

/// Peak absolute amplitude at or above this is treated as clipping.
const CLIPPING_LEVEL: i32 = 32_000;

#[derive(Debug, Clone, Copy)]
pub struct LevelStats {
    pub samples: usize,
    pub average_abs: i32,
    pub peak_abs: i32,
}

/// Why a clip was rejected by the level gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    Empty,
    TooQuiet { average: i32 },
    Clipping { peak: i32 },
}

impl std::fmt::Display for LevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelError::Empty => write!(f, "No audio captured"),
            LevelError::TooQuiet { average } => {
                write!(f, "Audio too quiet (average level {})", average)
            }
            LevelError::Clipping { peak } => {
                write!(f, "Audio clipping (peak level {})", peak)
            }
        }
    }
}

impl std::error::Error for LevelError {}

/// Compute average and peak absolute amplitude over a clip.
pub fn analyze(samples: &[i16]) -> LevelStats {
    let mut sum_abs: u64 = 0;
    let mut peak_abs: i32 = 0;

    for &sample in samples {
        let level = i32::from(sample).abs();
        sum_abs += level as u64;
        peak_abs = peak_abs.max(level);
    }

    let average_abs = if samples.is_empty() {
        0
    } else {
        (sum_abs / samples.len() as u64) as i32
    };

    LevelStats {
        samples: samples.len(),
        average_abs,
        peak_abs,
    }
}

/// Gate a clip on its amplitude stats. Runs before any persistence or
/// network work so bad captures fail cheaply.
pub fn validate(samples: &[i16]) -> Result<LevelStats, LevelError> {
    let stats = analyze(samples);

    if stats.samples == 0 {
        return Err(LevelError::Empty);
    }
    if stats.average_abs <= MIN_AVERAGE_LEVEL {
        return Err(LevelError::TooQuiet {
            average: stats.average_abs,
        });
    }
    if stats.peak_abs >= CLIPPING_LEVEL {
        return Err(LevelError::Clipping {
            peak: stats.peak_abs,
        });
    }

    log::debug!(
        "Level gate: {} samples, average={}, peak={}",
        stats.samples,
        stats.average_abs,
        stats.peak_abs
    );

    Ok(stats)
}

// Timeline - Musical time for the step grid
// Converts between tempo, ticks, steps and audio-clock samples

use crate::error::{EngineError, EngineResult};
use std::fmt;

/// Ticks per quarter note (standard MIDI resolution)
pub const TICKS_PER_QUARTER: u64 = 480;

/// Grid steps per beat (sixteenth notes)
pub const STEPS_PER_BEAT: u64 = 4;

/// Ticks covered by one grid step
pub const TICKS_PER_STEP: u64 = TICKS_PER_QUARTER / STEPS_PER_BEAT;

/// Tempo in BPM (Beats Per Minute)
///
/// Always finite and inside `[Tempo::MIN_BPM, Tempo::MAX_BPM]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 300.0;

    /// Creates a tempo from user input
    ///
    /// Non-finite or non-positive values are rejected. Anything else is clamped
    /// to the supported range; compare `bpm()` with the input to detect clamping.
    pub fn new(bpm: f64) -> EngineResult<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(EngineError::InvalidTempo(bpm));
        }
        Ok(Self {
            bpm: bpm.clamp(Self::MIN_BPM, Self::MAX_BPM),
        })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// True if `requested` had to be clamped to produce this tempo
    pub fn was_clamped_from(&self, requested: f64) -> bool {
        self.bpm != requested
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one grid step in seconds
    pub fn step_duration_seconds(&self) -> f64 {
        self.beat_duration_seconds() / STEPS_PER_BEAT as f64
    }

    /// Duration of one grid step in samples (fractional, the scheduler accumulates it)
    pub fn step_duration_samples(&self, sample_rate: f64) -> f64 {
        self.step_duration_seconds() * sample_rate
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl TryFrom<f64> for Tempo {
    type Error = EngineError;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Tempo::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Step index (0-based, wrapped to the loop) for a tick position
pub fn step_at(position_ticks: u64, steps: usize) -> usize {
    ((position_ticks / TICKS_PER_STEP) % steps as u64) as usize
}

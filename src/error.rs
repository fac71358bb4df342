// Engine errors - everything the UI layer can be told synchronously

use thiserror::Error;

/// Errors surfaced at the engine API boundary
///
/// Voice exhaustion has no variant: a full pool steals. Calls on a disposed
/// engine are no-ops, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Audio output could not be started yet (no device, no user gesture, stream refused).
    /// Recoverable: `play()` can simply be retried.
    #[error("Audio is locked: {0}")]
    AudioLocked(String),

    #[error("Invalid tempo: {0} BPM (must be finite and > 0)")]
    InvalidTempo(f64),

    #[error("Invalid swing amount: {0} (must be in [0, 1))")]
    InvalidSwing(f32),

    #[error("Invalid pattern dimensions: {rows}x{steps} (expected {expected_rows}x{expected_steps})")]
    InvalidPattern {
        rows: usize,
        steps: usize,
        expected_rows: usize,
        expected_steps: usize,
    },

    #[error("Cell out of range: row {row}, step {step}")]
    CellOutOfRange { row: usize, step: usize },

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for failures the caller can fix by retrying after a user gesture
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::AudioLocked(_) | EngineError::Stream(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// Melody Engine - Step-sequencer audio engine (library exports for the CLI, tests and benchmarks)

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod sequencer;
pub mod synth;

// Re-export commonly used types for convenience
pub use audio::{AudioHost, AudioTiming, CpalHost, EngineStats, ManualClock, ManualHost};
pub use config::EngineConfig;
pub use engine::{EngineState, PlayOutcome, SequencerEngine};
pub use error::{EngineError, EngineResult};
pub use messaging::{CallbackObserver, SequencerObserver, SubscriptionId};
pub use sequencer::{Pattern, Pitch, Preset, Tempo, ROWS, SCALE, STEPS};
pub use synth::WaveformType;

// Engine module - Facade over transport, scheduler and voices

pub mod sequencer_engine;
pub mod state;

pub use sequencer_engine::SequencerEngine;
pub use state::{EngineState, PlayOutcome};

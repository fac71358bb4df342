// Synth module - Sound generators rendered on the audio clock

pub mod envelope;
pub mod oscillator;
pub mod voice;
pub mod voice_bank;

pub use oscillator::WaveformType;
pub use voice::VoiceParams;
pub use voice_bank::{VoiceBank, DEFAULT_MAX_VOICES};

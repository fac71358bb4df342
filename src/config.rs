// Engine configuration - RON files, every field optional

use crate::error::{EngineError, EngineResult};
use crate::sequencer::pattern::Preset;
use crate::sequencer::timeline::Tempo;
use crate::synth::oscillator::WaveformType;
use crate::synth::voice::VoiceParams;
use crate::synth::voice_bank::DEFAULT_MAX_VOICES;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tempo_bpm: f64,
    /// Voice pool cap
    pub max_voices: usize,
    /// Scheduling horizon ahead of the audio clock
    pub lookahead_ms: f64,
    /// Note length as a fraction of a step
    pub gate: f64,
    /// Delay of odd steps as a fraction of half a step, in [0, 1)
    pub swing: f32,
    pub waveform: WaveformType,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub volume: f32,
    /// Grid loaded on creation
    pub preset: Preset,
    /// Audio -> UI visual channel size
    pub visual_capacity: usize,
    /// Visual events older than this when polled are dropped
    pub stale_visual_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tempo_bpm: 120.0,
            max_voices: DEFAULT_MAX_VOICES,
            lookahead_ms: 100.0,
            gate: 0.8,
            swing: 0.0,
            waveform: WaveformType::Triangle,
            attack_ms: 5.0,
            release_ms: 120.0,
            volume: 0.5,
            preset: Preset::Empty,
            visual_capacity: 256,
            stale_visual_ms: 250.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a RON document
    pub fn from_ron_str(source: &str) -> EngineResult<Self> {
        let config: EngineConfig = ron::from_str(source)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;
        config.validated()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    pub fn to_ron_string(&self) -> EngineResult<String> {
        ron::ser::to_string_pretty(self, PrettyConfig::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Normalize out-of-range values; reject what cannot be normalized
    ///
    /// Tempo is clamped to the supported range, swing must already be valid.
    pub fn validated(mut self) -> EngineResult<Self> {
        self.tempo_bpm = Tempo::new(self.tempo_bpm)?.bpm();

        if !self.swing.is_finite() || !(0.0..1.0).contains(&self.swing) {
            return Err(EngineError::InvalidSwing(self.swing));
        }
        if !self.lookahead_ms.is_finite() || self.lookahead_ms <= 0.0 {
            return Err(EngineError::Config(format!(
                "lookahead_ms must be positive, got {}",
                self.lookahead_ms
            )));
        }

        let defaults = Self::default();
        self.max_voices = self.max_voices.max(1);
        self.lookahead_ms = self.lookahead_ms.clamp(10.0, 1000.0);
        self.gate = finite_or(self.gate, defaults.gate).clamp(0.05, 1.0);
        self.attack_ms = finite_or(self.attack_ms, defaults.attack_ms).clamp(0.0, 2000.0);
        self.release_ms = finite_or(self.release_ms, defaults.release_ms).clamp(0.0, 5000.0);
        self.volume = finite_or(self.volume, defaults.volume).clamp(0.0, 1.0);
        self.visual_capacity = self.visual_capacity.max(16);
        self.stale_visual_ms = finite_or(self.stale_visual_ms, defaults.stale_visual_ms).max(0.0);
        Ok(self)
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.tempo_bpm).unwrap_or_default()
    }

    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            waveform: self.waveform,
            attack: self.attack_ms / 1000.0,
            release: self.release_ms / 1000.0,
            ..VoiceParams::default()
        }
    }
}

fn finite_or<T: Into<f64> + Copy>(value: T, fallback: T) -> T {
    if value.into().is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = EngineConfig::from_ron_str("(tempo_bpm: 90.0, waveform: Square)").unwrap();
        assert_eq!(config.tempo_bpm, 90.0);
        assert_eq!(config.waveform, WaveformType::Square);
        assert_eq!(config.max_voices, DEFAULT_MAX_VOICES);
        assert_eq!(config.lookahead_ms, 100.0);
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig::from_ron_str("(tempo_bpm: 900.0, max_voices: 0, gate: 3.0)").unwrap();
        assert_eq!(config.tempo_bpm, Tempo::MAX_BPM);
        assert_eq!(config.max_voices, 1);
        assert_eq!(config.gate, 1.0);

        assert!(matches!(
            EngineConfig::from_ron_str("(tempo_bpm: -1.0)"),
            Err(EngineError::InvalidTempo(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron_str("(swing: 1.5)"),
            Err(EngineError::InvalidSwing(_))
        ));
        assert!(matches!(
            EngineConfig::from_ron_str("(tempo_bpm: \"fast\")"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.ron");

        let config = EngineConfig {
            tempo_bpm: 96.0,
            preset: Preset::Lullaby,
            swing: 0.25,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.ron")),
            Err(EngineError::Io(_))
        ));
    }
}

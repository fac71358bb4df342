// Oscillators - Waveform generators for the voices

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

pub trait Oscillator {
    fn next_sample(&mut self) -> f32;
    fn set_frequency(&mut self, freq: f32);
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveformType {
    Sine,
    Square,
    Saw,
    #[default]
    Triangle,
}

/// Naive (non band-limited) oscillator; phase is normalized to [0, 1)
#[derive(Debug, Clone)]
pub struct SimpleOscillator {
    waveform: WaveformType,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
}

impl SimpleOscillator {
    pub fn new(waveform: WaveformType, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
        }
    }
}

impl Oscillator for SimpleOscillator {
    fn next_sample(&mut self) -> f32 {
        let p = self.phase;
        let sample = match self.waveform {
            WaveformType::Sine => (p * TAU).sin(),
            WaveformType::Square => {
                if p < 0.5 { 1.0 } else { -1.0 }
            }
            WaveformType::Saw => 2.0 * p - 1.0,
            WaveformType::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
        };

        self.phase = (self.phase + self.phase_increment).fract();
        sample
    }

    fn set_frequency(&mut self, freq: f32) {
        self.phase_increment = (freq / self.sample_rate).clamp(0.0, 0.5);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

// Audio timing - the audio clock
// A sample counter advanced only by the audio callback; every scheduled time is expressed in it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared audio clock
///
/// Cloning shares the same counter. The UI thread reads it to decide which
/// visual events are due; only the host's block loop advances it.
#[derive(Clone, Debug)]
pub struct AudioTiming {
    /// Current sample position (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Get current sample position (safe from any thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance sample position (called from audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::AcqRel);
    }

    pub fn current_seconds(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    pub fn millis_to_samples(&self, millis: f64) -> u64 {
        self.seconds_to_samples(millis / 1000.0)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_creation() {
        let timing = AudioTiming::new(48000.0);
        assert_eq!(timing.current_sample(), 0);
        assert_eq!(timing.sample_rate(), 48000.0);
    }

    #[test]
    fn test_advance_is_shared_between_clones() {
        let timing = AudioTiming::new(48000.0);
        let ui_view = timing.clone();
        timing.advance(480);
        timing.advance(480);
        assert_eq!(ui_view.current_sample(), 960);
        assert!((ui_view.current_seconds() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_conversions() {
        let timing = AudioTiming::new(48000.0);
        assert_eq!(timing.seconds_to_samples(1.0), 48000);
        assert_eq!(timing.millis_to_samples(10.0), 480);
        assert_eq!(timing.seconds_to_samples(-1.0), 0);
    }
}

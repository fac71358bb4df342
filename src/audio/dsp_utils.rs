// DSP utilities - Output hygiene and parameter smoothing for the audio callback

/// Flush denormals to zero
///
/// Denormal floats can slow some CPUs down dramatically inside the callback.
/// Threshold: 1e-15, far below 32-bit float noise.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping (tanh saturation)
///
/// Nearly linear around 0, asymptotic towards [-1, 1] for loud chords.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// 1-pole smoother for control values (master volume)
///
/// y[n] = y[n-1] + a * (x[n] - y[n-1])
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// `time_constant_ms`: time to reach ~63% of a new target
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let time_constant_samples = (time_constant_ms * 0.001 * sample_rate).max(1.0);
        Self {
            current: initial_value,
            coefficient: (1.0 / time_constant_samples).min(1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }

    /// Jump to a value without smoothing
    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(-0.25), -0.25);
    }

    #[test]
    fn test_soft_clip_bounds() {
        assert!(soft_clip(0.0).abs() < 1e-6);
        assert!(soft_clip(8.0) <= 1.0 && soft_clip(8.0) > 0.99);
        assert!(soft_clip(-8.0) >= -1.0 && soft_clip(-8.0) < -0.99);
    }

    #[test]
    fn test_smoother_converges_without_overshoot() {
        let mut smoother = OnePoleSmoother::new(0.0, 10.0, 48000.0);
        let mut value = 0.0;
        for _ in 0..4800 {
            value = smoother.process(1.0);
            assert!((0.0..=1.0).contains(&value));
        }
        assert!((value - 1.0).abs() < 0.01);

        smoother.reset(0.25);
        assert_eq!(smoother.get(), 0.25);
    }
}

// Attack/Release envelope
//
// Step-sequencer notes have a fixed length, so a linear AR shape is enough:
// rise to full level, hold while the note is on, fall to zero after release.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Hold,
    Release,
}

#[derive(Debug, Clone)]
pub struct ArEnvelope {
    stage: Stage,
    level: f32,
    attack_step: f32,
    release_step: f32,
    release_samples: f32,
}

impl ArEnvelope {
    /// Times in seconds; anything shorter than one sample is instantaneous
    pub fn new(attack: f32, release: f32, sample_rate: f32) -> Self {
        let attack_samples = (attack * sample_rate).max(1.0);
        let release_samples = (release * sample_rate).max(1.0);
        Self {
            stage: Stage::Idle,
            level: 0.0,
            attack_step: 1.0 / attack_samples,
            release_step: 1.0 / release_samples,
            release_samples,
        }
    }

    pub fn trigger(&mut self) {
        self.stage = Stage::Attack;
        self.level = 0.0;
    }

    /// Start the release from the current level
    pub fn release(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
            self.release_step = self.level.max(f32::EPSILON) / self.release_samples;
        }
    }

    /// Hard stop, no tail
    pub fn kill(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.stage != Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn process(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Hold;
                }
            }
            Stage::Hold => {}
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.kill();
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_hold_release() {
        // 10 samples attack, 20 samples release at 1 kHz
        let mut env = ArEnvelope::new(0.01, 0.02, 1000.0);
        assert!(!env.is_active());

        env.trigger();
        let mut last = 0.0;
        for _ in 0..10 {
            last = env.process();
        }
        assert!((last - 1.0).abs() < 1e-5);
        assert_eq!(env.process(), 1.0);

        env.release();
        assert!(env.is_releasing());
        for _ in 0..25 {
            env.process();
        }
        assert!(!env.is_active());
        assert_eq!(env.process(), 0.0);
    }

    #[test]
    fn test_release_from_partial_level() {
        let mut env = ArEnvelope::new(0.01, 0.01, 1000.0);
        env.trigger();
        for _ in 0..5 {
            env.process();
        }
        env.release();
        let mut samples = 0;
        while env.is_active() {
            env.process();
            samples += 1;
            assert!(samples < 100);
        }
        assert!(samples <= 11);
    }

    #[test]
    fn test_kill() {
        let mut env = ArEnvelope::new(0.001, 1.0, 48000.0);
        env.trigger();
        env.process();
        env.kill();
        assert!(!env.is_active());
    }
}

// Manual host - An audio clock advanced by hand
//
// Used for offline rendering, benchmarks and tests: blocks are rendered only
// when `ManualClock::run_block` is called, so timing is fully deterministic.

use crate::audio::core::{lock_or_recover, render_block, BlockOutcome, SharedCore};
use crate::audio::host::AudioHost;
use crate::audio::timing::AudioTiming;
use crate::error::{EngineError, EngineResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tracing::debug;

struct ManualShared {
    timing: AudioTiming,
    channels: usize,
    unlockable: AtomicBool,
    unlock_calls: AtomicUsize,
    /// While true, `unlock` waits (simulates a slow permission prompt)
    unlock_held: Mutex<bool>,
    unlock_released: Condvar,
    attached: Mutex<Option<SharedCore>>,
}

/// Host half, handed to the engine
pub struct ManualHost {
    shared: Arc<ManualShared>,
}

/// Driver half, kept by the caller to advance the clock
#[derive(Clone)]
pub struct ManualClock {
    shared: Arc<ManualShared>,
}

impl ManualHost {
    pub fn new(sample_rate: f64, channels: usize) -> (ManualHost, ManualClock) {
        let shared = Arc::new(ManualShared {
            timing: AudioTiming::new(sample_rate),
            channels: channels.max(1),
            unlockable: AtomicBool::new(true),
            unlock_calls: AtomicUsize::new(0),
            unlock_held: Mutex::new(false),
            unlock_released: Condvar::new(),
            attached: Mutex::new(None),
        });
        (
            ManualHost {
                shared: Arc::clone(&shared),
            },
            ManualClock { shared },
        )
    }
}

impl AudioHost for ManualHost {
    fn unlock(&mut self) -> EngineResult<AudioTiming> {
        self.shared.unlock_calls.fetch_add(1, Ordering::AcqRel);

        let mut held = lock_or_recover(&self.shared.unlock_held);
        while *held {
            held = self
                .shared
                .unlock_released
                .wait(held)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        drop(held);

        if !self.shared.unlockable.load(Ordering::Acquire) {
            return Err(EngineError::AudioLocked(
                "manual host refused to unlock".to_string(),
            ));
        }
        Ok(self.shared.timing.clone())
    }

    fn attach(&mut self, core: SharedCore) -> EngineResult<()> {
        *lock_or_recover(&self.shared.attached) = Some(core);
        debug!("manual host attached");
        Ok(())
    }

    fn detach(&mut self) {
        lock_or_recover(&self.shared.attached).take();
    }
}

impl ManualClock {
    /// Render `frames` frames on the attached core (silence if none) and advance the clock
    pub fn run_block(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.shared.channels];
        self.run_block_into(&mut out);
        out
    }

    /// Same as `run_block`, into a caller buffer (interleaved)
    pub fn run_block_into(&self, out: &mut [f32]) -> BlockOutcome {
        let core = lock_or_recover(&self.shared.attached).clone();
        match core {
            Some(core) => render_block(&core, &self.shared.timing, out, self.shared.channels),
            None => {
                out.fill(0.0);
                self.shared.timing.advance(out.len() / self.shared.channels);
                BlockOutcome::Rendered
            }
        }
    }

    /// Run `total_frames` in blocks of `block_frames`, concatenating the output
    pub fn run_for(&self, total_frames: usize, block_frames: usize) -> Vec<f32> {
        let block_frames = block_frames.max(1);
        let mut rendered = Vec::with_capacity(total_frames * self.shared.channels);
        let mut remaining = total_frames;
        while remaining > 0 {
            let frames = remaining.min(block_frames);
            rendered.extend(self.run_block(frames));
            remaining -= frames;
        }
        rendered
    }

    /// The audio clock the host runs on
    pub fn timing(&self) -> &AudioTiming {
        &self.shared.timing
    }

    pub fn current_sample(&self) -> u64 {
        self.shared.timing.current_sample()
    }

    pub fn set_unlockable(&self, unlockable: bool) {
        self.shared.unlockable.store(unlockable, Ordering::Release);
    }

    /// Make `unlock` wait until `release_unlock`
    pub fn hold_unlock(&self) {
        *lock_or_recover(&self.shared.unlock_held) = true;
    }

    pub fn release_unlock(&self) {
        *lock_or_recover(&self.shared.unlock_held) = false;
        self.shared.unlock_released.notify_all();
    }

    pub fn unlock_calls(&self) -> usize {
        self.shared.unlock_calls.load(Ordering::Acquire)
    }

    pub fn is_attached(&self) -> bool {
        lock_or_recover(&self.shared.attached).is_some()
    }
}

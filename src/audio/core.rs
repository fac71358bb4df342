// Engine core - The work done on the audio clock, one block at a time
//
// Owned behind `Arc<Mutex<_>>`: the audio callback only ever `try_lock`s it
// (silence on contention), control operations lock it briefly so a block
// never sees half of a transition.

use crate::audio::timing::AudioTiming;
use crate::messaging::visual::VisualProducer;
use crate::sequencer::pattern::PatternStore;
use crate::sequencer::scheduler::Scheduler;
use crate::sequencer::transport::SharedTransportState;
use crate::synth::voice_bank::VoiceBank;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, error};

pub type SharedCore = Arc<Mutex<EngineCore>>;

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub blocks: u64,
    /// Blocks whose processing panicked
    pub failed_blocks: u64,
    pub scheduled_steps: u64,
    pub skipped_steps: u64,
    pub dropped_visuals: u64,
    /// Visual events discarded by the UI side as too late
    pub late_visuals: u64,
    pub stolen_voices: u64,
}

pub struct EngineCore {
    transport: Arc<SharedTransportState>,
    patterns: PatternStore,
    scheduler: Scheduler,
    voices: VoiceBank,
    visual_tx: VisualProducer,
    disposed: bool,
    stats: EngineStats,
}

impl EngineCore {
    pub fn new(
        transport: Arc<SharedTransportState>,
        patterns: PatternStore,
        scheduler: Scheduler,
        voices: VoiceBank,
        visual_tx: VisualProducer,
    ) -> Self {
        Self {
            transport,
            patterns,
            scheduler,
            voices,
            visual_tx,
            disposed: false,
            stats: EngineStats::default(),
        }
    }

    /// Schedule what is due, then render `out` (interleaved, fully overwritten)
    pub fn process_block(&mut self, block_start: u64, out: &mut [f32], channels: usize) {
        if self.disposed {
            out.fill(0.0);
            return;
        }

        let frames = out.len() / channels.max(1);
        let report = self.scheduler.tick(
            block_start,
            frames,
            &self.transport,
            &self.patterns,
            &mut self.voices,
            &mut self.visual_tx,
        );
        self.stats.blocks += 1;
        self.stats.scheduled_steps += report.scheduled as u64;
        self.stats.skipped_steps += report.skipped as u64;
        self.stats.dropped_visuals += report.dropped_visual as u64;

        self.voices.render(block_start, out, channels);
    }

    /// Drop everything scheduled but not yet sounding; sounding notes fade out
    pub fn halt(&mut self) {
        self.scheduler.reset();
        let cancelled = self.voices.cancel_pending();
        self.voices.release_all();
        if cancelled > 0 {
            debug!(cancelled, "pending notes cancelled");
        }
    }

    /// Release every generator; later blocks render silence
    ///
    /// Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.halt();
        self.voices.dispose_all();
        self.disposed = true;
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.voices.set_volume(volume);
    }

    pub fn voices(&self) -> &VoiceBank {
        &self.voices
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            stolen_voices: self.voices.stolen_count(),
            ..self.stats
        }
    }

    fn record_failure(&mut self) {
        self.stats.failed_blocks += 1;
    }
}

/// How a host callback block went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Rendered,
    /// Core locked by a control operation, block is silent
    Contended,
    /// Processing panicked, block is silent
    Failed,
}

/// Run `work`, turning a panic into `None`
pub fn isolate<R>(work: impl FnOnce() -> R) -> Option<R> {
    catch_unwind(AssertUnwindSafe(work)).ok()
}

/// One audio block, as called from a host callback
///
/// Never blocks and never unwinds into the host. Advances the clock by the
/// block's frame count whatever happens, so the clock keeps tracking output.
pub fn render_block(
    core: &Mutex<EngineCore>,
    timing: &AudioTiming,
    out: &mut [f32],
    channels: usize,
) -> BlockOutcome {
    let channels = channels.max(1);
    let block_start = timing.current_sample();
    let frames = out.len() / channels;

    let outcome = match core.try_lock() {
        Ok(mut guard) => run_guarded(&mut guard, block_start, out, channels),
        Err(TryLockError::Poisoned(poisoned)) => {
            run_guarded(&mut poisoned.into_inner(), block_start, out, channels)
        }
        Err(TryLockError::WouldBlock) => {
            out.fill(0.0);
            BlockOutcome::Contended
        }
    };

    timing.advance(frames);
    outcome
}

fn run_guarded(core: &mut EngineCore, block_start: u64, out: &mut [f32], channels: usize) -> BlockOutcome {
    let processed = isolate(|| core.process_block(block_start, out, channels));
    if processed.is_some() {
        return BlockOutcome::Rendered;
    }

    error!(block_start, "audio block panicked, rendering silence");
    out.fill(0.0);
    core.record_failure();
    BlockOutcome::Failed
}

/// Lock a control-side mutex, recovering the data if a holder panicked
pub fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Transport - Playback control and the musical clock
// Single authority for tempo, running state and logical position

use super::pattern::STEPS;
use super::timeline::{step_at, Tempo, TICKS_PER_STEP};
use crate::audio::parameters::{AtomicF32, AtomicF64};
use crate::audio::timing::AudioTiming;
use crate::error::{EngineError, EngineResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Ticks in one loop of the grid
pub const LOOP_TICKS: u64 = STEPS as u64 * TICKS_PER_STEP;

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    /// Not running, position kept for resume
    Paused,
}

/// Shared transport state
/// Thread-safe via atomics: written by `Transport`, read by the scheduler on the audio clock
#[derive(Debug)]
pub struct SharedTransportState {
    running: AtomicBool,
    paused: AtomicBool,
    position_ticks: AtomicU64,
    tempo_bpm: AtomicF64,
    swing: AtomicF32,
    /// Bumped on every start from stopped and on every stop (not on resume);
    /// events stamped with an older id are stale
    run_id: AtomicU64,
}

impl SharedTransportState {
    pub fn new(tempo: Tempo) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            position_ticks: AtomicU64::new(0),
            tempo_bpm: AtomicF64::new(tempo.bpm()),
            swing: AtomicF32::new(0.0),
            run_id: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> TransportState {
        if self.running.load(Ordering::Acquire) {
            TransportState::Playing
        } else if self.paused.load(Ordering::Acquire) {
            TransportState::Paused
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn run_id(&self) -> u64 {
        self.run_id.load(Ordering::Acquire)
    }

    pub fn position_ticks(&self) -> u64 {
        self.position_ticks.load(Ordering::Relaxed)
    }

    /// Tempo used for the next look-ahead computation
    pub fn tempo(&self) -> Tempo {
        // Only `Transport::set_tempo` writes here, always with a validated value
        Tempo::new(self.tempo_bpm.get()).unwrap_or_default()
    }

    pub fn swing(&self) -> f32 {
        self.swing.get()
    }

    /// Advance position by `delta_ticks`, wrapping at the end of the loop
    /// Returns the new position
    pub fn advance_position(&self, delta_ticks: u64) -> u64 {
        let current = self.position_ticks.load(Ordering::Relaxed);
        let new_pos = (current + delta_ticks) % LOOP_TICKS;
        self.position_ticks.store(new_pos, Ordering::Relaxed);
        new_pos
    }
}

/// Transport controller
///
/// The only writer of `SharedTransportState`. Needs an attached audio clock
/// before it can start.
pub struct Transport {
    shared_state: Arc<SharedTransportState>,
    clock: Option<AudioTiming>,
}

impl Transport {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            shared_state: SharedTransportState::new(tempo),
            clock: None,
        }
    }

    /// Get shared state (for passing to the audio side)
    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared_state)
    }

    /// Connect the audio clock that drives scheduling
    pub fn attach_clock(&mut self, clock: AudioTiming) {
        self.clock = Some(clock);
    }

    /// Drop the audio clock; a running transport is stopped first
    pub fn detach_clock(&mut self) {
        self.stop();
        self.clock = None;
    }

    pub fn state(&self) -> TransportState {
        self.shared_state.state()
    }

    /// Start (or resume from a pause)
    ///
    /// A resume keeps the run id, so steps scheduled before the pause stay
    /// valid. Returns `Ok(false)` if already running. Fails without touching
    /// the state when no audio clock is attached.
    pub fn start(&mut self) -> EngineResult<bool> {
        if self.clock.is_none() {
            return Err(EngineError::AudioLocked(
                "transport has no audio clock".to_string(),
            ));
        }
        if self.shared_state.is_running() {
            return Ok(false);
        }

        let resuming = self.shared_state.paused.swap(false, Ordering::AcqRel);
        if !resuming {
            self.shared_state.run_id.fetch_add(1, Ordering::AcqRel);
        }
        self.shared_state.running.store(true, Ordering::Release);
        debug!(position = self.current_position(), resuming, "transport started");
        Ok(true)
    }

    /// Pause (keep current position)
    pub fn pause(&mut self) -> bool {
        if !self.shared_state.is_running() {
            return false;
        }
        self.shared_state.running.store(false, Ordering::Release);
        self.shared_state.paused.store(true, Ordering::Release);
        debug!(position = self.current_position(), "transport paused");
        true
    }

    /// Stop: full reset to position 0, invalidating everything scheduled by the previous run
    pub fn stop(&mut self) {
        self.shared_state.running.store(false, Ordering::Release);
        self.shared_state.paused.store(false, Ordering::Release);
        self.shared_state.run_id.fetch_add(1, Ordering::AcqRel);
        self.shared_state.position_ticks.store(0, Ordering::Relaxed);
    }

    /// Set tempo for future look-ahead computations
    ///
    /// Returns the tempo actually applied (clamped to the supported range).
    pub fn set_tempo(&mut self, bpm: f64) -> EngineResult<Tempo> {
        let tempo = Tempo::new(bpm)?;
        self.shared_state.tempo_bpm.set(tempo.bpm());
        Ok(tempo)
    }

    pub fn tempo(&self) -> Tempo {
        self.shared_state.tempo()
    }

    /// Delay applied to odd steps, as a fraction of half a step
    pub fn set_swing(&mut self, amount: f32) -> EngineResult<()> {
        if !amount.is_finite() || !(0.0..1.0).contains(&amount) {
            return Err(EngineError::InvalidSwing(amount));
        }
        self.shared_state.swing.set(amount);
        Ok(())
    }

    /// Position of the next step to be scheduled, in ticks
    pub fn current_position(&self) -> u64 {
        self.shared_state.position_ticks()
    }

    pub fn current_step(&self) -> usize {
        step_at(self.current_position(), STEPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_with_clock() -> Transport {
        let mut transport = Transport::new(Tempo::default());
        transport.attach_clock(AudioTiming::new(48000.0));
        transport
    }

    #[test]
    fn test_start_requires_clock() {
        let mut transport = Transport::new(Tempo::default());
        assert!(matches!(transport.start(), Err(EngineError::AudioLocked(_))));
        assert_eq!(transport.state(), TransportState::Stopped);
        assert!(!transport.shared_state().is_running());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut transport = transport_with_clock();
        assert!(transport.start().unwrap());
        let run = transport.shared_state().run_id();

        assert!(!transport.start().unwrap());
        assert_eq!(transport.shared_state().run_id(), run);
        assert_eq!(transport.state(), TransportState::Playing);
    }

    #[test]
    fn test_pause_keeps_position_stop_resets() {
        let mut transport = transport_with_clock();
        transport.start().unwrap();
        transport.shared_state().advance_position(3 * TICKS_PER_STEP);

        assert!(transport.pause());
        assert_eq!(transport.state(), TransportState::Paused);
        assert_eq!(transport.current_step(), 3);

        let run = transport.shared_state().run_id();
        transport.start().unwrap();
        assert_eq!(transport.current_step(), 3);
        assert_eq!(transport.shared_state().run_id(), run);

        transport.stop();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.current_position(), 0);
    }

    #[test]
    fn test_stop_bumps_run_id() {
        let mut transport = transport_with_clock();
        transport.start().unwrap();
        let run = transport.shared_state().run_id();
        transport.stop();
        assert!(transport.shared_state().run_id() > run);
    }

    #[test]
    fn test_position_wraps_at_loop_end() {
        let state = SharedTransportState::new(Tempo::default());
        state.advance_position(LOOP_TICKS - TICKS_PER_STEP);
        assert_eq!(step_at(state.position_ticks(), STEPS), STEPS - 1);
        assert_eq!(state.advance_position(TICKS_PER_STEP), 0);
    }

    #[test]
    fn test_set_tempo() {
        let mut transport = transport_with_clock();
        assert_eq!(transport.tempo().bpm(), 120.0);

        assert_eq!(transport.set_tempo(140.0).unwrap().bpm(), 140.0);
        assert_eq!(transport.shared_state().tempo().bpm(), 140.0);

        assert!(transport.set_tempo(0.0).is_err());
        assert!(transport.set_tempo(f64::NAN).is_err());
        assert_eq!(transport.tempo().bpm(), 140.0);

        assert_eq!(transport.set_tempo(1000.0).unwrap().bpm(), Tempo::MAX_BPM);
    }

    #[test]
    fn test_set_swing() {
        let mut transport = transport_with_clock();
        transport.set_swing(0.5).unwrap();
        assert_eq!(transport.shared_state().swing(), 0.5);
        assert!(transport.set_swing(1.0).is_err());
        assert!(transport.set_swing(-0.1).is_err());
        assert!(transport.set_swing(f32::NAN).is_err());
    }
}

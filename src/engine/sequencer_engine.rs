// Sequencer engine - The UI-facing facade and its lifecycle
//
// Uninitialized -> Initializing -> Stopped/Paused/Running -> Disposed
//
// The UI thread calls into the facade; the host renders blocks of the core on
// the audio clock; `poll()` brings due visual events back to the observers.
// Lock order: control, then core, then host. Observers are only notified
// with no other engine lock held.

use super::state::{AtomicEngineState, EngineState, PlayOutcome};
use crate::audio::core::{lock_or_recover, EngineCore, EngineStats, SharedCore};
use crate::audio::host::AudioHost;
use crate::audio::timing::AudioTiming;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::messaging::observer::{CallbackObserver, Observers, SequencerObserver, SubscriptionId};
use crate::messaging::visual::{create_visual_channel, VisualEvent, VisualFeed};
use crate::sequencer::pattern::{Pattern, PatternStore, Preset};
use crate::sequencer::scheduler::Scheduler;
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::Transport;
use crate::synth::voice_bank::VoiceBank;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// UI-owned settings, kept across rebuilds
struct Settings {
    tempo: Tempo,
    swing: f32,
    volume: f32,
}

/// Everything built by a successful unlock
struct Runtime {
    transport: Transport,
    core: SharedCore,
    feed: VisualFeed,
    clock: AudioTiming,
    last_step: Option<usize>,
    late_visuals: u64,
}

struct Control {
    settings: Settings,
    runtime: Option<Runtime>,
    /// Stop or pause requested while audio was unlocking: state to end in instead of running
    held_start: Option<EngineState>,
}

pub struct SequencerEngine<H: AudioHost> {
    config: EngineConfig,
    host: Mutex<H>,
    state: AtomicEngineState,
    /// Set while one `play()` is unlocking audio
    initializing: AtomicBool,
    patterns: PatternStore,
    control: Mutex<Control>,
    observers: Mutex<Observers>,
    /// Bumped by stop and dispose: visual events drained under an older value are not delivered
    generation: AtomicU64,
}

impl<H: AudioHost> SequencerEngine<H> {
    pub fn new(host: H, config: EngineConfig) -> EngineResult<Self> {
        let config = config.validated()?;
        let settings = Settings {
            tempo: config.tempo(),
            swing: config.swing,
            volume: config.volume,
        };
        Ok(Self {
            patterns: PatternStore::new(config.preset.pattern()),
            host: Mutex::new(host),
            state: AtomicEngineState::default(),
            initializing: AtomicBool::new(false),
            control: Mutex::new(Control {
                settings,
                runtime: None,
                held_start: None,
            }),
            observers: Mutex::new(Observers::new()),
            generation: AtomicU64::new(0),
            config,
        })
    }

    pub fn with_defaults(host: H) -> EngineResult<Self> {
        Self::new(host, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    // ========== Lifecycle ==========

    /// Start (or resume) playback, unlocking audio and building the engine on first use
    ///
    /// An unlock failure returns `EngineError::AudioLocked` and leaves the
    /// engine `Uninitialized`, ready for a retry.
    pub fn play(&self) -> EngineResult<PlayOutcome> {
        match self.state.get() {
            EngineState::Running => Ok(PlayOutcome::AlreadyRunning),
            EngineState::Initializing => Ok(self.play_when_unlocked()),
            EngineState::Stopped | EngineState::Paused => self.start_transport(),
            EngineState::Uninitialized | EngineState::Disposed => self.initialize(),
        }
    }

    fn start_transport(&self) -> EngineResult<PlayOutcome> {
        let started = {
            let mut control = lock_or_recover(&self.control);
            match control.runtime.as_mut() {
                Some(runtime) => {
                    let _core = lock_or_recover(&runtime.core);
                    let started = runtime.transport.start()?;
                    debug!(step = runtime.transport.current_step(), started, "transport start");
                    Some(started)
                }
                None => None,
            }
        };

        match started {
            Some(true) => {
                self.state.set(EngineState::Running);
                Ok(PlayOutcome::Started)
            }
            Some(false) => Ok(PlayOutcome::AlreadyRunning),
            // Disposed between the state check and the lock
            None => self.initialize(),
        }
    }

    /// A `play()` during the unlock: the latest request wins over an earlier stop or pause
    fn play_when_unlocked(&self) -> PlayOutcome {
        let mut control = lock_or_recover(&self.control);
        if control.held_start.take().is_some() {
            debug!("held start released by play()");
        }
        debug!("play() while audio is unlocking");
        PlayOutcome::Pending
    }

    fn initialize(&self) -> EngineResult<PlayOutcome> {
        if self
            .initializing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(self.play_when_unlocked());
        }

        let result = if self.state.get().is_ready() {
            // Another call finished initializing first
            self.start_transport()
        } else {
            self.build_and_start()
        };
        self.initializing.store(false, Ordering::Release);
        result
    }

    fn build_and_start(&self) -> EngineResult<PlayOutcome> {
        {
            let mut control = lock_or_recover(&self.control);
            control.held_start = None;
            self.state.set(EngineState::Initializing);
        }
        info!("unlocking audio");

        let unlocked = lock_or_recover(&self.host).unlock();
        let clock = match unlocked {
            Ok(clock) => clock,
            Err(e) => {
                self.state
                    .transition(EngineState::Initializing, EngineState::Uninitialized);
                warn!(error = %e, "audio unlock failed");
                return Err(e);
            }
        };

        let (mut transport, core, feed) = self.build_runtime_parts(&clock);
        if let Err(e) = lock_or_recover(&self.host).attach(Arc::clone(&core)) {
            self.state
                .transition(EngineState::Initializing, EngineState::Uninitialized);
            warn!(error = %e, "audio host refused the engine");
            return Err(e);
        }

        let mut control = lock_or_recover(&self.control);
        if self.state.get() != EngineState::Initializing {
            lock_or_recover(&core).dispose();
            lock_or_recover(&self.host).detach();
            info!("engine disposed during audio unlock, start cancelled");
            return Ok(PlayOutcome::Cancelled);
        }

        // Settings may have changed while unlocking
        let held_start = control.held_start.take();
        let settings = &control.settings;
        transport.set_tempo(settings.tempo.bpm())?;
        transport.set_swing(settings.swing)?;
        {
            let mut core = lock_or_recover(&core);
            core.set_volume(settings.volume);
            if held_start.is_none() {
                transport.start()?;
            }
        }

        info!(
            sample_rate = clock.sample_rate(),
            tempo = %transport.tempo(),
            max_voices = self.config.max_voices,
            held = ?held_start,
            "engine built"
        );
        control.runtime = Some(Runtime {
            transport,
            core,
            feed,
            clock,
            last_step: None,
            late_visuals: 0,
        });
        match held_start {
            Some(state) => {
                self.state.set(state);
                Ok(PlayOutcome::Interrupted)
            }
            None => {
                self.state.set(EngineState::Running);
                Ok(PlayOutcome::Started)
            }
        }
    }

    fn build_runtime_parts(&self, clock: &AudioTiming) -> (Transport, SharedCore, VisualFeed) {
        let sample_rate = clock.sample_rate();
        let mut transport = Transport::new(self.config.tempo());
        transport.attach_clock(clock.clone());

        let (visual_tx, visual_rx) = create_visual_channel(self.config.visual_capacity);
        let core = EngineCore::new(
            transport.shared_state(),
            self.patterns.clone(),
            Scheduler::new(sample_rate, self.config.lookahead_ms, self.config.gate),
            VoiceBank::new(
                self.config.max_voices,
                self.config.voice_params(),
                self.config.volume,
                sample_rate as f32,
            ),
            visual_tx,
        );
        (
            transport,
            Arc::new(Mutex::new(core)),
            VisualFeed::new(visual_rx),
        )
    }

    /// Pause, keeping the position; `play()` resumes at the next step
    pub fn pause(&self) -> bool {
        let mut control = lock_or_recover(&self.control);
        if self.state.get() == EngineState::Initializing {
            control.held_start.get_or_insert(EngineState::Paused);
            debug!("pause during audio unlock, start held");
            return true;
        }
        let Some(runtime) = control.runtime.as_mut() else {
            debug!(state = ?self.state.get(), "pause ignored");
            return false;
        };

        let paused = {
            let _core = lock_or_recover(&runtime.core);
            runtime.transport.pause()
        };
        if paused {
            self.state.set(EngineState::Paused);
            debug!(step = ?runtime.last_step, "playback paused");
        }
        paused
    }

    /// Full reset: position 0, pending notes and visuals cancelled
    ///
    /// Observers get `on_step(-1)` and `on_note_play(None)` before this returns.
    pub fn stop(&self) {
        {
            let mut control = lock_or_recover(&self.control);
            if self.state.get() == EngineState::Disposed {
                debug!("stop on disposed engine ignored");
                return;
            }
            if let Some(runtime) = control.runtime.as_mut() {
                {
                    let mut core = lock_or_recover(&runtime.core);
                    runtime.transport.stop();
                    core.halt();
                }
                let discarded = runtime.feed.discard_all();
                runtime.last_step = None;
                self.state.set(EngineState::Stopped);
                debug!(discarded, "playback stopped");
            } else if self.state.get() == EngineState::Initializing {
                control.held_start = Some(EngineState::Stopped);
                debug!("stop during audio unlock, start held");
            }
            self.generation.fetch_add(1, Ordering::AcqRel);
        }

        let mut observers = lock_or_recover(&self.observers);
        if self.state.get() != EngineState::Disposed {
            observers.notify_reset();
        }
    }

    /// Tear everything down; callable at any point, any number of times
    ///
    /// Order: stop the transport (cancels pending events), dispose the voices,
    /// detach from the host, mark disposed. No observer is called once this returns.
    pub fn dispose(&self) {
        let mut control = lock_or_recover(&self.control);
        if self.state.get() == EngineState::Disposed {
            debug!("engine already disposed");
            return;
        }

        if let Some(mut runtime) = control.runtime.take() {
            {
                let mut core = lock_or_recover(&runtime.core);
                runtime.transport.stop();
                core.dispose();
            }
            lock_or_recover(&self.host).detach();
            runtime.transport.detach_clock();
            runtime.feed.discard_all();
        }
        self.state.set(EngineState::Disposed);
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(control);

        // Wait out a poll() that is already notifying
        drop(lock_or_recover(&self.observers));
        info!("engine disposed");
    }

    // ========== Pattern ==========

    /// Publish a complete new grid; heard from the next scheduler tick
    pub fn set_pattern(&self, pattern: Pattern) {
        self.patterns.publish(pattern);
    }

    /// Publish a grid coming from the UI layer, rejecting wrong dimensions
    pub fn set_pattern_grid<R: AsRef<[bool]>>(&self, grid: &[R]) -> EngineResult<()> {
        let pattern = Pattern::from_grid(grid)?;
        self.set_pattern(pattern);
        Ok(())
    }

    /// Flip one cell; returns its new value
    pub fn toggle_cell(&self, row: usize, step: usize) -> EngineResult<bool> {
        // Validate once up front, the edit below cannot fail after that
        self.patterns.snapshot().toggled(row, step)?;
        let updated = self
            .patterns
            .update(|current| current.toggled(row, step).unwrap_or(*current));
        Ok(updated.is_active(row, step))
    }

    pub fn apply_preset(&self, preset: Preset) {
        debug!(preset = preset.name(), "preset applied");
        self.set_pattern(preset.pattern());
    }

    pub fn clear_pattern(&self) {
        self.set_pattern(Pattern::new());
    }

    pub fn pattern(&self) -> Pattern {
        self.patterns.snapshot()
    }

    // ========== Tempo / swing / volume ==========

    /// Set the tempo for steps not yet scheduled
    ///
    /// Values outside the supported range are clamped; the applied tempo is returned.
    pub fn set_tempo(&self, bpm: f64) -> EngineResult<Tempo> {
        let tempo = Tempo::new(bpm)?;
        if tempo.was_clamped_from(bpm) {
            debug!(requested = bpm, applied = tempo.bpm(), "tempo clamped");
        }

        let mut control = lock_or_recover(&self.control);
        control.settings.tempo = tempo;
        if let Some(runtime) = control.runtime.as_mut() {
            runtime.transport.set_tempo(tempo.bpm())?;
        }
        Ok(tempo)
    }

    pub fn tempo(&self) -> Tempo {
        lock_or_recover(&self.control).settings.tempo
    }

    pub fn set_swing(&self, amount: f32) -> EngineResult<()> {
        if !amount.is_finite() || !(0.0..1.0).contains(&amount) {
            return Err(EngineError::InvalidSwing(amount));
        }
        let mut control = lock_or_recover(&self.control);
        control.settings.swing = amount;
        if let Some(runtime) = control.runtime.as_mut() {
            runtime.transport.set_swing(amount)?;
        }
        Ok(())
    }

    pub fn swing(&self) -> f32 {
        lock_or_recover(&self.control).settings.swing
    }

    /// Master volume in [0, 1], smoothed on the audio side
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        let mut control = lock_or_recover(&self.control);
        control.settings.volume = volume;
        if let Some(runtime) = control.runtime.as_ref() {
            lock_or_recover(&runtime.core).set_volume(volume);
        }
    }

    // ========== Visual sync ==========

    /// Deliver every visual event that is due on the audio clock
    ///
    /// Call from the UI frame loop. Returns the number of steps delivered.
    pub fn poll(&self) -> usize {
        let mut due: Vec<VisualEvent> = Vec::new();
        let generation;
        {
            let mut control = lock_or_recover(&self.control);
            generation = self.generation.load(Ordering::Acquire);
            let Some(runtime) = control.runtime.as_mut() else {
                return 0;
            };

            let now = runtime.clock.current_sample();
            let run_id = runtime.transport.shared_state().run_id();
            let max_lateness = runtime.clock.millis_to_samples(self.config.stale_visual_ms);
            let report = runtime
                .feed
                .drain_due(now, run_id, max_lateness, |event| due.push(*event));

            if report.late > 0 {
                runtime.late_visuals += report.late as u64;
                warn!(late = report.late, "visual events too old, dropped");
            }
            if let Some(last) = due.last() {
                runtime.last_step = Some(last.step);
            }
        }

        if due.is_empty() {
            return 0;
        }
        let mut observers = lock_or_recover(&self.observers);
        if self.generation.load(Ordering::Acquire) != generation {
            return 0;
        }
        for event in &due {
            observers.notify_step(event.step, event.primary_row);
        }
        due.len()
    }

    pub fn subscribe<O: SequencerObserver + 'static>(&self, observer: O) -> SubscriptionId {
        lock_or_recover(&self.observers).subscribe(Box::new(observer))
    }

    /// Subscribe two closures: `on_step(step | -1)` and `on_note_play(row | None)`
    pub fn on_events<S, N>(&self, on_step: S, on_note_play: N) -> SubscriptionId
    where
        S: FnMut(i32) + Send + 'static,
        N: FnMut(Option<usize>) + Send + 'static,
    {
        self.subscribe(CallbackObserver::new(on_step, on_note_play))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock_or_recover(&self.observers).unsubscribe(id)
    }

    // ========== Diagnostics ==========

    /// Last step delivered to observers, `None` when stopped or not started
    pub fn current_step(&self) -> Option<usize> {
        lock_or_recover(&self.control)
            .runtime
            .as_ref()
            .and_then(|runtime| runtime.last_step)
    }

    /// Audio clock of the running engine
    pub fn clock(&self) -> Option<AudioTiming> {
        lock_or_recover(&self.control)
            .runtime
            .as_ref()
            .map(|runtime| runtime.clock.clone())
    }

    pub fn stats(&self) -> EngineStats {
        let control = lock_or_recover(&self.control);
        match control.runtime.as_ref() {
            Some(runtime) => EngineStats {
                late_visuals: runtime.late_visuals,
                ..lock_or_recover(&runtime.core).stats()
            },
            None => EngineStats::default(),
        }
    }

    /// Voices currently waiting or sounding
    pub fn busy_voices(&self) -> usize {
        lock_or_recover(&self.control)
            .runtime
            .as_ref()
            .map(|runtime| lock_or_recover(&runtime.core).voices().busy_count())
            .unwrap_or(0)
    }
}

impl<H: AudioHost> Drop for SequencerEngine<H> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// Integration test: Engine lifecycle
//
// Unlock, duplicate play, pause/stop, dispose and rebuild, driven through a
// manual audio host so audio permission and rendering are under test control.

use melody_engine::{
    EngineError, EngineState, ManualClock, ManualHost, PlayOutcome, Preset, SequencerEngine,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 480;

fn engine_with_counter() -> (SequencerEngine<ManualHost>, ManualClock, Arc<AtomicUsize>) {
    let (host, clock) = ManualHost::new(SAMPLE_RATE, 2);
    let engine = SequencerEngine::with_defaults(host).unwrap();
    engine.apply_preset(Preset::ScaleRun);

    let calls = Arc::new(AtomicUsize::new(0));
    let on_step = Arc::clone(&calls);
    let on_note = Arc::clone(&calls);
    engine.on_events(
        move |_| {
            on_step.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            on_note.fetch_add(1, Ordering::SeqCst);
        },
    );
    (engine, clock, calls)
}

fn run(engine: &SequencerEngine<ManualHost>, clock: &ManualClock, blocks: usize) {
    for _ in 0..blocks {
        clock.run_block(BLOCK);
        engine.poll();
    }
}

/// Spin until `condition` holds (bounded)
fn wait_for(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_state_transitions() {
    let (engine, clock, _calls) = engine_with_counter();
    assert_eq!(engine.state(), EngineState::Uninitialized);

    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    assert_eq!(engine.state(), EngineState::Running);
    assert!(clock.is_attached());

    assert_eq!(engine.play().unwrap(), PlayOutcome::AlreadyRunning);

    assert!(engine.pause());
    assert_eq!(engine.state(), EngineState::Paused);
    assert!(!engine.pause());

    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);

    engine.dispose();
    assert_eq!(engine.state(), EngineState::Disposed);
    assert!(!clock.is_attached());

    // Audio was only unlocked once
    assert_eq!(clock.unlock_calls(), 1);
}

#[test]
fn test_unlock_failure_then_retry() {
    let (engine, clock, _calls) = engine_with_counter();
    clock.set_unlockable(false);

    let err = engine.play().unwrap_err();
    assert!(matches!(err, EngineError::AudioLocked(_)));
    assert!(err.is_recoverable());
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(!clock.is_attached());

    clock.set_unlockable(true);
    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(clock.unlock_calls(), 2);
}

#[test]
fn test_duplicate_play_during_unlock() {
    let (engine, clock, _calls) = engine_with_counter();
    let engine = Arc::new(engine);
    clock.hold_unlock();

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.play())
    };
    wait_for(|| clock.unlock_calls() == 1);

    assert_eq!(engine.state(), EngineState::Initializing);
    assert_eq!(engine.play().unwrap(), PlayOutcome::Pending);

    clock.release_unlock();
    assert_eq!(first.join().unwrap().unwrap(), PlayOutcome::Started);

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(clock.unlock_calls(), 1);
}

#[test]
fn test_dispose_during_unlock_cancels_start() {
    let (engine, clock, calls) = engine_with_counter();
    let engine = Arc::new(engine);
    clock.hold_unlock();

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.play())
    };
    wait_for(|| clock.unlock_calls() == 1);

    engine.dispose();
    clock.release_unlock();
    assert_eq!(first.join().unwrap().unwrap(), PlayOutcome::Cancelled);

    assert_eq!(engine.state(), EngineState::Disposed);
    assert!(!clock.is_attached());
    run(&engine, &clock, 20);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stop_during_unlock_holds_start() {
    let (engine, clock, calls) = engine_with_counter();
    let engine = Arc::new(engine);
    clock.hold_unlock();

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.play())
    };
    wait_for(|| clock.unlock_calls() == 1);

    engine.stop();
    clock.release_unlock();
    assert_eq!(first.join().unwrap().unwrap(), PlayOutcome::Interrupted);

    // Built and attached, but the transport never ran
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(clock.is_attached());
    let after_reset = calls.load(Ordering::SeqCst);
    run(&engine, &clock, 30);
    assert_eq!(calls.load(Ordering::SeqCst), after_reset);
    assert_eq!(engine.current_step(), None);

    // A later play starts without another unlock
    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    assert_eq!(engine.state(), EngineState::Running);
    run(&engine, &clock, 10);
    assert!(calls.load(Ordering::SeqCst) > after_reset);
    assert_eq!(clock.unlock_calls(), 1);
}

#[test]
fn test_pause_during_unlock_holds_start() {
    let (engine, clock, calls) = engine_with_counter();
    let engine = Arc::new(engine);
    clock.hold_unlock();

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.play())
    };
    wait_for(|| clock.unlock_calls() == 1);

    assert!(engine.pause());
    clock.release_unlock();
    assert_eq!(first.join().unwrap().unwrap(), PlayOutcome::Interrupted);

    assert_eq!(engine.state(), EngineState::Paused);
    run(&engine, &clock, 30);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    run(&engine, &clock, 10);
    assert!(calls.load(Ordering::SeqCst) > 0);
}

#[test]
fn test_play_after_stop_during_unlock_wins() {
    let (engine, clock, _calls) = engine_with_counter();
    let engine = Arc::new(engine);
    clock.hold_unlock();

    let first = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.play())
    };
    wait_for(|| clock.unlock_calls() == 1);

    engine.stop();
    assert_eq!(engine.play().unwrap(), PlayOutcome::Pending);
    clock.release_unlock();
    assert_eq!(first.join().unwrap().unwrap(), PlayOutcome::Started);

    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(clock.unlock_calls(), 1);
}

#[test]
fn test_dispose_is_idempotent() {
    let (engine, clock, _calls) = engine_with_counter();
    engine.play().unwrap();
    run(&engine, &clock, 10);

    engine.dispose();
    engine.dispose();
    engine.dispose();
    assert_eq!(engine.state(), EngineState::Disposed);
    assert_eq!(engine.busy_voices(), 0);

    // Disposing a never-started engine is fine too
    let (fresh, _clock, _calls) = engine_with_counter();
    fresh.dispose();
    fresh.dispose();
    assert_eq!(fresh.state(), EngineState::Disposed);
}

#[test]
fn test_no_callbacks_after_dispose() {
    let (engine, clock, calls) = engine_with_counter();
    engine.play().unwrap();
    run(&engine, &clock, 30);
    assert!(calls.load(Ordering::SeqCst) > 0);

    engine.dispose();
    let at_dispose = calls.load(Ordering::SeqCst);

    // Detached: blocks render silence and nothing reaches observers
    let out = clock.run_for(48000, BLOCK);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(engine.poll(), 0);
    engine.stop();
    assert!(!engine.pause());

    assert_eq!(calls.load(Ordering::SeqCst), at_dispose);
}

#[test]
fn test_dispose_while_rendering_and_polling() {
    let (engine, clock, calls) = engine_with_counter();
    let engine = Arc::new(engine);
    engine.play().unwrap();

    let disposed = Arc::new(AtomicBool::new(false));
    let worker = {
        let engine = Arc::clone(&engine);
        let clock = clock.clone();
        let disposed = Arc::clone(&disposed);
        thread::spawn(move || {
            // Keep going for a while after dispose returns
            let mut after = 0;
            while after < 200 {
                clock.run_block(BLOCK);
                engine.poll();
                if disposed.load(Ordering::SeqCst) {
                    after += 1;
                }
            }
        })
    };

    wait_for(|| calls.load(Ordering::SeqCst) >= 10);
    engine.dispose();
    let at_dispose = calls.load(Ordering::SeqCst);
    disposed.store(true, Ordering::SeqCst);

    worker.join().unwrap();
    println!("callbacks at dispose: {}", at_dispose);
    assert_eq!(calls.load(Ordering::SeqCst), at_dispose);
    assert_eq!(engine.state(), EngineState::Disposed);
}

#[test]
fn test_play_after_dispose_rebuilds() {
    let (engine, clock, calls) = engine_with_counter();
    engine.set_tempo(90.0).unwrap();
    engine.play().unwrap();
    run(&engine, &clock, 10);
    engine.dispose();

    // Settings survive the rebuild
    engine.set_swing(0.5).unwrap();
    let before = calls.load(Ordering::SeqCst);
    assert_eq!(engine.play().unwrap(), PlayOutcome::Started);
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(clock.unlock_calls(), 2);
    assert!(clock.is_attached());
    assert_eq!(engine.tempo().bpm(), 90.0);
    assert_eq!(engine.swing(), 0.5);

    run(&engine, &clock, 10);
    assert!(calls.load(Ordering::SeqCst) > before);
}

#[test]
fn test_stop_before_start_resets_observers() {
    let (host, _clock) = ManualHost::new(SAMPLE_RATE, 1);
    let engine = SequencerEngine::with_defaults(host).unwrap();

    let steps = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&steps);
    engine.on_events(move |step| seen.lock().unwrap().push(step), |_| {});

    engine.stop();
    assert_eq!(*steps.lock().unwrap(), vec![-1]);
    assert_eq!(engine.state(), EngineState::Uninitialized);
}

#[test]
fn test_drop_disposes() {
    let (engine, clock, _calls) = engine_with_counter();
    engine.play().unwrap();
    assert!(clock.is_attached());

    drop(engine);
    assert!(!clock.is_attached());
}

#[test]
fn test_unsubscribed_observer_is_silent() {
    let (host, clock) = ManualHost::new(SAMPLE_RATE, 1);
    let engine = SequencerEngine::with_defaults(host).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = engine.on_events(
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        |_| {},
    );

    engine.play().unwrap();
    run(&engine, &clock, 5);
    assert!(calls.load(Ordering::SeqCst) > 0);

    assert!(engine.unsubscribe(id));
    let before = calls.load(Ordering::SeqCst);
    run(&engine, &clock, 50);
    assert_eq!(calls.load(Ordering::SeqCst), before);
}

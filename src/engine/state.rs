// Engine lifecycle state

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing built yet (also the state after a failed unlock)
    Uninitialized = 0,
    /// Audio unlock in progress
    Initializing = 1,
    Stopped = 2,
    Paused = 3,
    Running = 4,
    Disposed = 5,
}

impl EngineState {
    /// Transport, scheduler and voices exist
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            EngineState::Stopped | EngineState::Paused | EngineState::Running
        )
    }
}

impl From<u8> for EngineState {
    fn from(value: u8) -> Self {
        match value {
            1 => EngineState::Initializing,
            2 => EngineState::Stopped,
            3 => EngineState::Paused,
            4 => EngineState::Running,
            5 => EngineState::Disposed,
            _ => EngineState::Uninitialized,
        }
    }
}

/// Lock-free view of the state, readable from any thread
#[derive(Debug)]
pub struct AtomicEngineState {
    inner: AtomicU8,
}

impl AtomicEngineState {
    pub fn new(state: EngineState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    pub fn get(&self) -> EngineState {
        EngineState::from(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: EngineState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Move `from` -> `to`; `false` (and no change) if the state was not `from`
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicEngineState {
    fn default() -> Self {
        Self::new(EngineState::Uninitialized)
    }
}

/// Result of a `play()` call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Transport started (or resumed)
    Started,
    AlreadyRunning,
    /// Another `play()` is still unlocking audio; this call did nothing
    Pending,
    /// `dispose()` ran while audio was unlocking; nothing was started
    Cancelled,
    /// `stop()` or `pause()` ran while audio was unlocking: the engine is
    /// built and attached but the transport was not started
    Interrupted,
}

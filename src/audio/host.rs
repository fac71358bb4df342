// Audio host - The boundary to whatever actually drives the audio clock

use crate::audio::core::SharedCore;
use crate::audio::timing::AudioTiming;
use crate::error::EngineResult;

/// An output backend that owns the audio clock
///
/// Lifecycle as seen by the engine: `unlock` (may fail until the environment
/// allows sound), then `attach` a core whose blocks the host renders on its
/// own clock, then `detach` to stop calling into it.
pub trait AudioHost {
    /// Make audio output possible and return the clock it runs on
    ///
    /// Fails with `EngineError::AudioLocked` while output cannot start yet.
    /// Calling it again after success returns the same clock.
    fn unlock(&mut self) -> EngineResult<AudioTiming>;

    /// Start rendering blocks of `core`, replacing any previous core
    fn attach(&mut self, core: SharedCore) -> EngineResult<()>;

    /// Stop calling into the attached core; no block starts after this returns
    fn detach(&mut self);
}

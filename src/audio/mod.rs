// Audio module - The audio clock, its hosts and the per-block engine core

pub mod core;
pub mod cpal_host;
pub mod dsp_utils;
pub mod host;
pub mod manual;
pub mod parameters;
pub mod timing;

pub use self::core::{EngineCore, EngineStats, SharedCore};
pub use cpal_host::CpalHost;
pub use host::AudioHost;
pub use manual::{ManualClock, ManualHost};
pub use timing::AudioTiming;

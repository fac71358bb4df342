// Sequencer module - Step grid, musical clock and look-ahead scheduling

pub mod pattern;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use pattern::{Pattern, PatternStore, Pitch, Preset, ROWS, SCALE, STEPS};
pub use scheduler::{ScheduledEvent, Scheduler, TickReport};
pub use timeline::Tempo;
pub use transport::{SharedTransportState, Transport, TransportState};

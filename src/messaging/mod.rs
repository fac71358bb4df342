// Messaging - Audio -> UI notifications

pub mod observer;
pub mod visual;

pub use observer::{CallbackObserver, Observers, SequencerObserver, SubscriptionId};
pub use visual::{create_visual_channel, VisualEvent, VisualFeed};

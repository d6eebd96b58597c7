//! Concrete observers attached to a live session.
//!
//! One module per notification category. Everything except the power watcher
//! only logs what it sees; the power watcher additionally debounces raw
//! updates and publishes stable transitions as webhook events.

mod audio;
mod device;
mod keyboard;
mod power;
mod push;

pub use audio::VolumeLogger;
pub use device::ConnectionLogger;
pub use keyboard::FocusLogger;
pub use power::{PowerDebounce, PowerWatcher};
pub use push::PlaybackLogger;

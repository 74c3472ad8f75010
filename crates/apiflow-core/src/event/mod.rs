//! Event buses and post-commit sync publication.

pub mod bus;
pub mod sync;

pub use bus::EventBus;
pub use sync::SyncTracker;

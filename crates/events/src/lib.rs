//! Process-wide event bus for donor lifecycle and coordinator traffic.
//!
//! Donor instances publish their transitions here; the HTTP layer streams
//! them out and the coordinator watcher consumes phase notifications.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;

//! Event bus for run lifecycle notifications.
//!
//! Provides an `EventBus` that distributes `ForgeEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;

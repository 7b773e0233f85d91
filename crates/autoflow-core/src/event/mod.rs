//! Event bus for store notifications.
//!
//! Provides an `EventBus` that distributes `StoreEvent` messages to all
//! subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;

//! Event distribution for the observability sink.

pub mod bus;

pub use bus::EventBus;

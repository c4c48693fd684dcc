//! Shared domain types for the Leadline workflow engine.
//!
//! This crate contains the types shared across the engine: workflow
//! definitions, execution records, circuit breaker state, engine events,
//! and storage error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod breaker;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod workflow;

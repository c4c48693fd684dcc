//! Observability bootstrap for Leadline.
//!
//! Structured logging via tracing-subscriber, with an optional
//! OpenTelemetry bridge for trace export.

pub mod tracing_setup;

//! Engine configuration.
//!
//! Deserialized from `config.toml` by the infrastructure layer. Every field
//! has a default so a missing or partial file still yields a working
//! configuration.

use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreakerConfig;
use crate::workflow::RetryPolicy;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Coordinator scheduling defaults.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Default circuit breaker tuning for services without overrides.
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Default retry policy for steps that enable retries without tuning.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Outbound HTTP client settings.
    #[serde(default)]
    pub http: HttpSettings,
}

/// Coordinator scheduling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Global ceiling on concurrently running steps per execution.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Step timeout applied when a step does not set its own.
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout when a step does not set its own.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

//! Circuit breaker configuration and observability types.
//!
//! The state machine itself lives in leadline-core; these types are shared
//! so stores and event consumers can describe breaker state without
//! depending on the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning for a per-service circuit breaker.
///
/// Mutable at runtime; changes take effect on the next evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip CLOSED -> OPEN.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open breaker rejects calls before probing.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Consecutive HALF_OPEN successes required to close.
    #[serde(default = "default_half_open_required_successes")]
    pub half_open_required_successes: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_half_open_required_successes() -> u32 {
    2
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            half_open_required_successes: default_half_open_required_successes(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The three states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Fast-fail; no network attempt is made until the cooldown elapses.
    Open,
    /// Bounded probe calls allowed through to test recovery.
    HalfOpen,
}

/// Point-in-time view of one breaker, for the observability surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// External service identifier (breaker registry key).
    pub service: String,
    pub state: CircuitState,
    /// Consecutive failures while CLOSED.
    pub consecutive_failures: u32,
    /// Consecutive successes while HALF_OPEN.
    pub consecutive_successes: u32,
    /// When the breaker last changed state.
    pub last_state_change: DateTime<Utc>,
    /// Total calls that reached the transport through this breaker.
    pub total_calls: u64,
    /// Total failed calls.
    pub total_failures: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config: CircuitBreakerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown_ms, 30_000);
        assert_eq!(config.half_open_required_successes, 2);
        assert_eq!(config, CircuitBreakerConfig::default());
    }

    #[test]
    fn circuit_state_serde() {
        for (state, expected) in [
            (CircuitState::Closed, "\"closed\""),
            (CircuitState::Open, "\"open\""),
            (CircuitState::HalfOpen, "\"half_open\""),
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, expected);
            let parsed: CircuitState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let snapshot = CircuitBreakerSnapshot {
            service: "crm".to_string(),
            state: CircuitState::Open,
            consecutive_failures: 5,
            consecutive_successes: 0,
            last_state_change: Utc::now(),
            total_calls: 42,
            total_failures: 7,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: CircuitBreakerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.service, "crm");
        assert_eq!(parsed.state, CircuitState::Open);
        assert_eq!(parsed.total_calls, 42);
    }
}

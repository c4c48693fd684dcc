//! Per-service circuit breaker state machine and registry.
//!
//! One breaker per external service identifier, long-lived and shared by all
//! concurrent executions calling that service. State transitions and counter
//! updates on a given service are serialized behind a mutex (single-writer
//! discipline); the registry publishes every transition to the event bus.
//!
//! State machine:
//! - CLOSED (initial): calls pass through; each failure increments a
//!   consecutive-failure counter, each success resets it.
//! - CLOSED -> OPEN when the counter reaches `failure_threshold`.
//! - OPEN: `try_acquire` rejects immediately -- no network attempt -- until
//!   `cooldown_ms` has elapsed, then the next evaluation moves to HALF_OPEN.
//! - HALF_OPEN: probe calls are allowed. Any failure reopens the breaker
//!   (cooldown restarts); `half_open_required_successes` consecutive
//!   successes close it with counters reset.
//! - Manual reset forces CLOSED regardless of counters.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use leadline_types::breaker::{CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
use leadline_types::event::EngineEvent;

use crate::event::EventBus;

use super::step::StepError;

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { consecutive_successes: u32 },
}

/// A state transition, reported so the registry can publish it.
pub type Transition = (CircuitState, CircuitState);

/// Failure-isolation state machine for one external service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    state: BreakerState,
    last_state_change: DateTime<Utc>,
    total_calls: u64,
    total_failures: u64,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            state: BreakerState::Closed {
                consecutive_failures: 0,
            },
            last_state_change: Utc::now(),
            total_calls: 0,
            total_failures: 0,
        }
    }

    /// Whether a call may proceed. Evaluating an OPEN breaker whose cooldown
    /// has elapsed transitions it to HALF_OPEN.
    pub fn try_acquire(&mut self) -> (bool, Option<Transition>) {
        match &self.state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen { .. } => (true, None),
            BreakerState::Open { opened_at } => {
                let cooldown = Duration::from_millis(self.config.cooldown_ms);
                if opened_at.elapsed() >= cooldown {
                    let transition = self.set_state(BreakerState::HalfOpen {
                        consecutive_successes: 0,
                    });
                    (true, transition)
                } else {
                    (false, None)
                }
            }
        }
    }

    /// Record a successful call that reached the transport.
    pub fn record_success(&mut self) -> Option<Transition> {
        self.total_calls += 1;
        match &self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                if *consecutive_failures > 0 {
                    self.state = BreakerState::Closed {
                        consecutive_failures: 0,
                    };
                }
                None
            }
            BreakerState::HalfOpen {
                consecutive_successes,
            } => {
                let count = consecutive_successes + 1;
                if count >= self.config.half_open_required_successes {
                    self.set_state(BreakerState::Closed {
                        consecutive_failures: 0,
                    })
                } else {
                    self.state = BreakerState::HalfOpen {
                        consecutive_successes: count,
                    };
                    None
                }
            }
            // A success while open means the call was already in flight when
            // the breaker tripped; the counters stay untouched.
            BreakerState::Open { .. } => None,
        }
    }

    /// Record a failed call that reached the transport.
    pub fn record_failure(&mut self) -> Option<Transition> {
        self.total_calls += 1;
        self.total_failures += 1;
        match &self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let count = consecutive_failures + 1;
                if count >= self.config.failure_threshold {
                    self.set_state(BreakerState::Open {
                        opened_at: Instant::now(),
                    })
                } else {
                    self.state = BreakerState::Closed {
                        consecutive_failures: count,
                    };
                    None
                }
            }
            // A probe failed: reopen, cooldown restarts
            BreakerState::HalfOpen { .. } => self.set_state(BreakerState::Open {
                opened_at: Instant::now(),
            }),
            BreakerState::Open { .. } => None,
        }
    }

    /// Force the breaker CLOSED regardless of counters.
    pub fn reset(&mut self) -> Option<Transition> {
        match self.state {
            BreakerState::Closed { .. } => {
                self.state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
                None
            }
            _ => self.set_state(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Replace the configuration. Takes effect on the next evaluation.
    pub fn update_config(&mut self, config: CircuitBreakerConfig) {
        self.config = config;
    }

    pub fn state(&self) -> CircuitState {
        match self.state {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let (consecutive_failures, consecutive_successes) = match self.state {
            BreakerState::Closed {
                consecutive_failures,
            } => (consecutive_failures, 0),
            BreakerState::Open { .. } => (0, 0),
            BreakerState::HalfOpen {
                consecutive_successes,
            } => (0, consecutive_successes),
        };
        CircuitBreakerSnapshot {
            service: self.service.clone(),
            state: self.state(),
            consecutive_failures,
            consecutive_successes,
            last_state_change: self.last_state_change,
            total_calls: self.total_calls,
            total_failures: self.total_failures,
        }
    }

    fn set_state(&mut self, next: BreakerState) -> Option<Transition> {
        let from = self.state();
        self.state = next;
        let to = self.state();
        self.last_state_change = Utc::now();
        if from != to { Some((from, to)) } else { None }
    }
}

// ---------------------------------------------------------------------------
// BreakerRegistry
// ---------------------------------------------------------------------------

/// Registry mapping service id -> breaker, shared across executions.
///
/// Breakers are created lazily with the registry's default configuration.
/// Every state transition is published as `CircuitStateChanged`.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<Mutex<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    events: EventBus,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig, events: EventBus) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            events,
        }
    }

    fn breaker(&self, service: &str) -> Arc<Mutex<CircuitBreaker>> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CircuitBreaker::new(
                    service,
                    self.default_config,
                )))
            })
            .clone()
    }

    /// Gate an outbound call. An open breaker rejects with
    /// `StepError::CircuitOpen` and no network attempt is made.
    pub fn try_acquire(&self, service: &str) -> Result<(), StepError> {
        let breaker = self.breaker(service);
        let (allowed, transition) = breaker.lock().expect("breaker lock").try_acquire();
        self.publish(service, transition);
        if allowed {
            Ok(())
        } else {
            Err(StepError::CircuitOpen {
                service: service.to_string(),
            })
        }
    }

    /// Record a successful call that reached the transport.
    pub fn record_success(&self, service: &str) {
        let breaker = self.breaker(service);
        let transition = breaker.lock().expect("breaker lock").record_success();
        self.publish(service, transition);
    }

    /// Record a failed call that reached the transport.
    pub fn record_failure(&self, service: &str) {
        let breaker = self.breaker(service);
        let transition = breaker.lock().expect("breaker lock").record_failure();
        self.publish(service, transition);
    }

    /// Manually force a breaker CLOSED.
    pub fn reset(&self, service: &str) {
        let breaker = self.breaker(service);
        let transition = breaker.lock().expect("breaker lock").reset();
        self.publish(service, transition);
    }

    /// Replace a breaker's configuration at runtime.
    pub fn update_config(&self, service: &str, config: CircuitBreakerConfig) {
        let breaker = self.breaker(service);
        breaker.lock().expect("breaker lock").update_config(config);
    }

    pub fn state(&self, service: &str) -> Option<CircuitState> {
        self.breakers
            .get(service)
            .map(|b| b.lock().expect("breaker lock").state())
    }

    pub fn snapshot(&self, service: &str) -> Option<CircuitBreakerSnapshot> {
        self.breakers
            .get(service)
            .map(|b| b.lock().expect("breaker lock").snapshot())
    }

    /// Snapshots of every known breaker, for the observability surface.
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| entry.value().lock().expect("breaker lock").snapshot())
            .collect()
    }

    fn publish(&self, service: &str, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            tracing::info!(service, ?from, ?to, "circuit breaker state changed");
            self.events.publish(EngineEvent::CircuitStateChanged {
                service: service.to_string(),
                from,
                to,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

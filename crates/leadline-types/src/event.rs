//! Engine events published to the observability sink.
//!
//! The engine emits these over a broadcast bus; consumers (log shippers,
//! dashboards, test assertions) subscribe without the engine knowing about
//! their persistence or query surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breaker::CircuitState;
use crate::execution::ExecutionStatus;
use crate::workflow::StepKind;

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An execution has been created and scheduling has begun.
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
    },
    /// An execution reached a terminal status.
    ExecutionCompleted {
        execution_id: Uuid,
        workflow_name: String,
        status: ExecutionStatus,
        duration_ms: u64,
    },
    /// A step was dispatched.
    StepStarted {
        execution_id: Uuid,
        step_id: String,
        kind: StepKind,
    },
    /// A step finished successfully.
    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },
    /// A step attempt failed. `will_retry` is true when the retry policy
    /// has budget remaining for another attempt.
    StepFailed {
        execution_id: Uuid,
        step_id: String,
        error: String,
        will_retry: bool,
    },
    /// A step was skipped (unselected branch or failed dependency).
    StepSkipped {
        execution_id: Uuid,
        step_id: String,
        reason: String,
    },
    /// A circuit breaker changed state.
    CircuitStateChanged {
        service: String,
        from: CircuitState,
        to: CircuitState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serde_tagging() {
        let event = EngineEvent::CircuitStateChanged {
            service: "crm".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"circuit_state_changed\""));
        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            EngineEvent::CircuitStateChanged {
                from: CircuitState::Closed,
                to: CircuitState::Open,
                ..
            }
        ));
    }

    #[test]
    fn step_failed_roundtrip() {
        let event = EngineEvent::StepFailed {
            execution_id: Uuid::now_v7(),
            step_id: "fetch".to_string(),
            error: "HTTP 503".to_string(),
            will_retry: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            EngineEvent::StepFailed {
                step_id, will_retry, ..
            } => {
                assert_eq!(step_id, "fetch");
                assert!(will_retry);
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
    }
}

//! Execution tracking types.
//!
//! An `Execution` is one run of a workflow against a specific input. It is
//! created by the coordinator when a workflow is triggered, mutated only by
//! the coordinator, and immutable once terminal. Per-step status, timing,
//! output, and error detail live on `StepRecord` -- no step output is ever
//! silently dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::workflow::StepKind;

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// One run of a workflow against a specific input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the workflow definition being executed.
    pub workflow_id: Uuid,
    /// Name of the workflow (denormalized for display).
    pub workflow_name: String,
    /// Current execution status.
    pub status: ExecutionStatus,
    /// The original trigger payload, exposed to steps via `{{input.*}}`.
    pub input: Value,
    /// Snapshot of the execution context (step outputs keyed by step id).
    pub context: Value,
    /// Per-step status, timing, output, and error.
    pub steps: Vec<StepRecord>,
    /// The first fatal step error, if the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status (None while running).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Step record
// ---------------------------------------------------------------------------

/// Status of an individual step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Execution record for a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step ID matching `StepDefinition.id`.
    pub step_id: String,
    /// Step name (denormalized for display).
    pub step_name: String,
    /// The kind of step.
    pub kind: StepKind,
    /// Current step status.
    pub status: StepStatus,
    /// Number of attempts made (0 until first dispatch, then 1-based).
    pub attempts: u32,
    /// Output produced by this step. Kept even when a later step fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When step execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When step execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl StepRecord {
    /// A fresh pending record for a step.
    pub fn pending(step_id: impl Into<String>, step_name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            step_id: step_id.into(),
            step_name: step_name.into(),
            kind,
            status: StepStatus::Pending,
            attempts: 0,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Orchestration coordinator: drives one execution end to end.
//!
//! The coordinator loads the workflow, validates it, builds the dependency
//! graph, then loops: compute the ready set (steps whose dependencies are
//! all terminal and successful), dispatch it concurrently up to the
//! configured ceiling, await completions, merge outputs into the context,
//! and re-evaluate readiness. It terminates when every step is terminal or
//! the workflow's failure policy aborts scheduling.
//!
//! Failure policies:
//! - **fail-fast** (default): stop scheduling new steps once a required
//!   step fails; already-dispatched branches run to completion.
//! - **continue**: independent branches proceed; the final status reflects
//!   whether any required step failed.
//!
//! The execution context is owned exclusively by this coordinator instance;
//! circuit breakers are the only state shared across executions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use leadline_types::error::StoreError;
use leadline_types::event::EngineEvent;
use leadline_types::execution::{Execution, ExecutionStatus, StepRecord, StepStatus};
use leadline_types::workflow::{FailurePolicy, StepConfig, Workflow, WorkflowStatus};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::EventBus;
use crate::store::WorkflowStore;

use super::definition::{WorkflowError, validate_workflow};
use super::graph::ExecutionGraph;
use super::step::{StepError, StepExecutor, StepOutcome, StepScope};

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

/// Coordinator-level defaults; individual workflows may override.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Global ceiling on concurrently running steps per execution.
    pub max_concurrency: usize,
    /// Step timeout applied when a step does not set its own.
    pub default_step_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            default_step_timeout_ms: 30_000,
        }
    }
}

/// Errors that reject an execution before (or instead of) running it.
/// A workflow whose steps merely fail still yields `Ok(Execution)` with
/// status `Failed` -- the record carries the diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Malformed workflow (validation or cycle). No step has run.
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Unknown workflow id.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// The workflow exists but is paused or archived.
    #[error("workflow '{0}' is not active")]
    WorkflowInactive(String),

    /// Unknown execution id (for cancel).
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// One coordinating process per execution: holds injected references to the
/// workflow store, step executor (which owns transport + breakers), and
/// event bus, so tests can swap in fakes.
pub struct Coordinator<S: WorkflowStore> {
    store: Arc<S>,
    steps: Arc<StepExecutor>,
    events: EventBus,
    config: CoordinatorConfig,
    /// Cancellation tokens keyed by execution id.
    cancellations: DashMap<Uuid, CancellationToken>,
}

/// What one dispatched step task reports back.
struct DispatchResult {
    step_id: String,
    outcome: StepOutcome,
    duration_ms: u64,
}

impl<S: WorkflowStore + 'static> Coordinator<S> {
    pub fn new(store: Arc<S>, steps: Arc<StepExecutor>, events: EventBus) -> Self {
        Self {
            store,
            steps,
            events,
            config: CoordinatorConfig::default(),
            cancellations: DashMap::new(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Start an execution: given a workflow id and input, run it to a
    /// terminal state and return the persisted execution record.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        input: Value,
    ) -> Result<Execution, CoordinatorError> {
        let workflow = self
            .store
            .load_workflow(&workflow_id)
            .await?
            .ok_or(CoordinatorError::WorkflowNotFound(workflow_id))?;
        if workflow.status != WorkflowStatus::Active {
            return Err(CoordinatorError::WorkflowInactive(workflow.name.clone()));
        }

        // Graph-level errors reject the execution before any step runs.
        validate_workflow(&workflow)?;
        let graph = ExecutionGraph::build(&workflow)?;

        let execution_id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        self.cancellations.insert(execution_id, cancel.clone());

        let started_at = Utc::now();
        let run_start = std::time::Instant::now();

        let mut statuses: HashMap<String, StepStatus> = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepStatus::Pending))
            .collect();
        let mut records: HashMap<String, StepRecord> = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), StepRecord::pending(&s.id, &s.name, s.kind)))
            .collect();
        let mut outputs: HashMap<String, Value> = HashMap::new();

        let mut execution = Execution {
            id: execution_id,
            workflow_id,
            workflow_name: workflow.name.clone(),
            status: ExecutionStatus::Running,
            input: input.clone(),
            context: context_json(&input, &workflow, &outputs),
            steps: ordered_records(&workflow, &records),
            error: None,
            started_at,
            completed_at: None,
        };
        self.store.save_execution(&execution).await?;

        self.events.publish(EngineEvent::ExecutionStarted {
            execution_id,
            workflow_id,
            workflow_name: workflow.name.clone(),
        });
        tracing::info!(
            execution_id = %execution_id,
            workflow = workflow.name.as_str(),
            "starting workflow execution"
        );

        let result = self
            .schedule(
                &workflow,
                &graph,
                execution_id,
                &input,
                &mut statuses,
                &mut records,
                &mut outputs,
                &cancel,
            )
            .await;

        self.cancellations.remove(&execution_id);

        let status = if result.cancelled {
            ExecutionStatus::Cancelled
        } else if result.first_error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Succeeded
        };

        execution.status = status;
        execution.error = result.first_error;
        execution.context = context_json(&input, &workflow, &outputs);
        execution.steps = ordered_records(&workflow, &records);
        execution.completed_at = Some(Utc::now());
        self.store.save_execution(&execution).await?;

        let duration_ms = run_start.elapsed().as_millis() as u64;
        self.events.publish(EngineEvent::ExecutionCompleted {
            execution_id,
            workflow_name: workflow.name.clone(),
            status,
            duration_ms,
        });
        tracing::info!(
            execution_id = %execution_id,
            workflow = workflow.name.as_str(),
            ?status,
            duration_ms,
            "workflow execution finished"
        );

        Ok(execution)
    }

    /// Cancel a running execution: no new steps are scheduled; in-flight
    /// steps observe the token and wind down.
    pub fn cancel(&self, execution_id: Uuid) -> Result<(), CoordinatorError> {
        if let Some((_, token)) = self.cancellations.remove(&execution_id) {
            token.cancel();
            tracing::info!(execution_id = %execution_id, "execution cancelled");
            Ok(())
        } else {
            Err(CoordinatorError::ExecutionNotFound(execution_id))
        }
    }

    // -- The readiness loop --

    #[allow(clippy::too_many_arguments)]
    async fn schedule(
        &self,
        workflow: &Workflow,
        graph: &ExecutionGraph,
        execution_id: Uuid,
        input: &Value,
        statuses: &mut HashMap<String, StepStatus>,
        records: &mut HashMap<String, StepRecord>,
        outputs: &mut HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> ScheduleResult {
        let max_concurrency = workflow
            .max_concurrency
            .unwrap_or(self.config.max_concurrency)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let deadline = workflow
            .deadline_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
        let policy = workflow.failure_policy;

        let mut join_set: JoinSet<DispatchResult> = JoinSet::new();
        let mut halted = false;
        let mut deadline_hit = false;
        let mut first_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                halted = true;
            }

            // Dispatch every currently-ready step, in `order` tie-break order.
            if !halted {
                let ready: Vec<_> = graph
                    .ready_steps(statuses)
                    .into_iter()
                    .cloned()
                    .collect();
                for step in ready {
                    statuses.insert(step.id.clone(), StepStatus::Running);
                    if let Some(record) = records.get_mut(&step.id) {
                        record.status = StepStatus::Running;
                        record.started_at = Some(Utc::now());
                    }

                    let child_steps: Vec<_> = match &step.config {
                        StepConfig::Parallel { children, .. } => children
                            .iter()
                            .filter_map(|id| graph.step(id).cloned())
                            .collect(),
                        _ => Vec::new(),
                    };
                    let scope = StepScope {
                        input: input.clone(),
                        config: workflow.config.clone(),
                        outputs: outputs.clone(),
                        item: None,
                        index: None,
                    };
                    let executor = Arc::clone(&self.steps);
                    let semaphore = Arc::clone(&semaphore);
                    let token = cancel.clone();
                    let events = self.events.clone();
                    let step_timeout = Duration::from_millis(
                        step.timeout_ms.unwrap_or(self.config.default_step_timeout_ms),
                    );

                    join_set.spawn(async move {
                        let _permit =
                            semaphore.acquire_owned().await.expect("semaphore open");
                        let start = std::time::Instant::now();

                        if token.is_cancelled() {
                            return DispatchResult {
                                step_id: step.id.clone(),
                                outcome: StepOutcome::failure(StepError::Cancelled, 0),
                                duration_ms: 0,
                            };
                        }

                        events.publish(EngineEvent::StepStarted {
                            execution_id,
                            step_id: step.id.clone(),
                            kind: step.kind,
                        });
                        tracing::debug!(step_id = step.id.as_str(), "dispatching step");

                        let outcome = match tokio::time::timeout(
                            step_timeout,
                            executor.execute(
                                execution_id,
                                &step,
                                &child_steps,
                                &scope,
                                policy,
                                &token,
                            ),
                        )
                        .await
                        {
                            Ok(outcome) => outcome,
                            Err(_elapsed) => StepOutcome::failure(StepError::Timeout, 1),
                        };

                        DispatchResult {
                            step_id: step.id.clone(),
                            outcome,
                            duration_ms: start.elapsed().as_millis() as u64,
                        }
                    });
                }
            }

            // Skip cascade: steps that can never run because a predecessor
            // failed or was skipped. Repeats until a fixed point.
            loop {
                let blocked: Vec<String> = graph
                    .blocked_steps(statuses)
                    .iter()
                    .map(|s| s.id.clone())
                    .collect();
                if blocked.is_empty() {
                    break;
                }
                for step_id in blocked {
                    self.mark_skipped(
                        execution_id,
                        &step_id,
                        "upstream step failed or was skipped",
                        statuses,
                        records,
                    );
                }
            }

            if join_set.is_empty() {
                if halted || graph.ready_steps(statuses).is_empty() {
                    break;
                }
                continue;
            }

            // Await the next completion, bounded by the execution deadline.
            let joined = match deadline {
                Some(at) if !deadline_hit => {
                    match tokio::time::timeout_at(at, join_set.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            // Deadline expiry behaves like external cancellation
                            deadline_hit = true;
                            halted = true;
                            cancel.cancel();
                            tracing::warn!(
                                execution_id = %execution_id,
                                "execution deadline exceeded, cancelling"
                            );
                            continue;
                        }
                    }
                }
                _ => join_set.join_next().await,
            };
            let Some(joined) = joined else {
                continue;
            };

            match joined {
                Ok(dispatch) => {
                    let required_failure = self.apply_outcome(
                        execution_id,
                        graph,
                        dispatch,
                        statuses,
                        records,
                        outputs,
                        &mut first_error,
                    );
                    if required_failure && policy == FailurePolicy::FailFast {
                        halted = true;
                    }
                }
                Err(join_error) => {
                    first_error
                        .get_or_insert_with(|| format!("task join error: {join_error}"));
                    halted = true;
                }
            }
        }

        // Whatever is still pending was never scheduled
        let leftover: Vec<String> = statuses
            .iter()
            .filter(|(_, status)| **status == StepStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        for step_id in leftover {
            self.mark_skipped(
                execution_id,
                &step_id,
                "scheduling stopped before this step became ready",
                statuses,
                records,
            );
        }

        let cancelled = cancel.is_cancelled();
        if cancelled && first_error.is_none() {
            first_error = Some(if deadline_hit {
                "execution deadline exceeded".to_string()
            } else {
                "execution cancelled".to_string()
            });
        }

        ScheduleResult {
            cancelled,
            first_error,
        }
    }

    /// Fold one step's outcome into the execution state. Returns whether
    /// this was a failure the workflow must count (not `continue_on_error`).
    #[allow(clippy::too_many_arguments)]
    fn apply_outcome(
        &self,
        execution_id: Uuid,
        graph: &ExecutionGraph,
        dispatch: DispatchResult,
        statuses: &mut HashMap<String, StepStatus>,
        records: &mut HashMap<String, StepRecord>,
        outputs: &mut HashMap<String, Value>,
        first_error: &mut Option<String>,
    ) -> bool {
        let DispatchResult {
            step_id,
            outcome,
            duration_ms,
        } = dispatch;

        // Parallel children are real steps: fold their terminal states and
        // outputs in first, so dependents and later references see them.
        for child in &outcome.children {
            statuses.insert(child.step_id.clone(), child.status);
            if let Some(record) = records.get_mut(&child.step_id) {
                record.status = child.status;
                record.attempts = child.attempts;
                record.output = child.output.clone();
                record.error = child.error.clone();
                record.completed_at = Some(Utc::now());
                record.duration_ms = Some(child.duration_ms);
            }
            if child.status == StepStatus::Succeeded {
                if let Some(output) = &child.output {
                    outputs.insert(child.step_id.clone(), output.clone());
                }
            }
        }

        statuses.insert(step_id.clone(), outcome.status);
        if let Some(record) = records.get_mut(&step_id) {
            record.status = outcome.status;
            record.attempts = outcome.attempts;
            record.output = outcome.output.clone();
            record.error = outcome.error.as_ref().map(|e| e.to_string());
            record.completed_at = Some(Utc::now());
            record.duration_ms = Some(duration_ms);
        }

        match outcome.status {
            StepStatus::Succeeded => {
                if let Some(output) = &outcome.output {
                    outputs.insert(step_id.clone(), output.clone());
                }
                self.events.publish(EngineEvent::StepCompleted {
                    execution_id,
                    step_id: step_id.clone(),
                    duration_ms,
                });

                // Branch selection: the unselected target (and, via the
                // cascade, its exclusive dependents) will never run.
                if let Some(branch) = &outcome.branch {
                    if statuses.get(&branch.unselected) == Some(&StepStatus::Pending) {
                        self.mark_skipped(
                            execution_id,
                            &branch.unselected,
                            "branch not selected",
                            statuses,
                            records,
                        );
                    }
                }
                false
            }
            _ => {
                let error_text = outcome
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                self.events.publish(EngineEvent::StepFailed {
                    execution_id,
                    step_id: step_id.clone(),
                    error: error_text.clone(),
                    will_retry: false,
                });

                let continue_on_error = graph
                    .step(&step_id)
                    .map(|s| s.continue_on_error)
                    .unwrap_or(false);
                if continue_on_error {
                    tracing::warn!(
                        step_id = step_id.as_str(),
                        error = error_text.as_str(),
                        "step failed but is marked continue_on_error"
                    );
                    false
                } else {
                    first_error
                        .get_or_insert_with(|| format!("step '{step_id}' failed: {error_text}"));
                    true
                }
            }
        }
    }

    fn mark_skipped(
        &self,
        execution_id: Uuid,
        step_id: &str,
        reason: &str,
        statuses: &mut HashMap<String, StepStatus>,
        records: &mut HashMap<String, StepRecord>,
    ) {
        statuses.insert(step_id.to_string(), StepStatus::Skipped);
        if let Some(record) = records.get_mut(step_id) {
            record.status = StepStatus::Skipped;
            record.error = Some(reason.to_string());
            record.completed_at = Some(Utc::now());
        }
        self.events.publish(EngineEvent::StepSkipped {
            execution_id,
            step_id: step_id.to_string(),
            reason: reason.to_string(),
        });
    }
}

struct ScheduleResult {
    cancelled: bool,
    first_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Context snapshot persisted on the execution record: the input, static
/// config, and every step output produced so far.
fn context_json(input: &Value, workflow: &Workflow, outputs: &HashMap<String, Value>) -> Value {
    json!({
        "input": input,
        "config": workflow.config,
        "steps": outputs,
    })
}

/// Step records in workflow declaration order.
fn ordered_records(workflow: &Workflow, records: &HashMap<String, StepRecord>) -> Vec<StepRecord> {
    workflow
        .steps
        .iter()
        .filter_map(|s| records.get(&s.id).cloned())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Workflow definition parsing and structural validation.
//!
//! Converts between YAML and the canonical `Workflow` type and validates
//! structural constraints (unique IDs, valid references, kind/config
//! agreement, container ownership). Cycle detection lives in `graph`.

use std::collections::{HashMap, HashSet};

use leadline_types::workflow::{StepConfig, StepDefinition, Workflow};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised before any step of an execution runs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Two steps share the same ID.
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    /// A step references an unknown step ID.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// The dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step's declared kind disagrees with its config variant.
    #[error("step '{step_id}' declares kind {declared:?} but its config is {actual:?}")]
    KindMismatch {
        step_id: String,
        declared: leadline_types::workflow::StepKind,
        actual: leadline_types::workflow::StepKind,
    },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `Workflow`.
///
/// Runs `validate_workflow` after deserialization, so the returned value is
/// guaranteed to be structurally valid (acyclicity is checked separately by
/// the graph builder at execution start).
pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Serialize a `Workflow` to a YAML string.
pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| WorkflowError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `Workflow`.
///
/// Checks:
/// - Name is non-empty and contains only alphanumeric characters and hyphens
/// - At least one step exists
/// - All step IDs are unique
/// - Every step's declared kind matches its config variant
/// - All `depends_on` references point to existing step IDs
/// - Conditional targets exist, differ from the conditional itself, and are
///   not parallel-contained steps
/// - Parallel children exist, are leaf kinds, declare no dependencies of
///   their own, and belong to exactly one container
/// - ForEach templates are leaf kinds with no dependencies of their own
/// - Wait steps specify a delay or a condition, with a positive poll interval
/// - `max_concurrency` and `deadline_secs` are positive when set
pub fn validate_workflow(workflow: &Workflow) -> Result<(), WorkflowError> {
    if workflow.name.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }
    if !workflow
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(WorkflowError::Validation(format!(
            "workflow name '{}' contains invalid characters (only alphanumeric and hyphens allowed)",
            workflow.name
        )));
    }

    if workflow.steps.is_empty() {
        return Err(WorkflowError::Validation(
            "workflow must have at least one step".to_string(),
        ));
    }

    if workflow.max_concurrency == Some(0) {
        return Err(WorkflowError::Validation(
            "max_concurrency must be >= 1".to_string(),
        ));
    }
    if workflow.deadline_secs == Some(0) {
        return Err(WorkflowError::Validation(
            "deadline_secs must be >= 1".to_string(),
        ));
    }

    // Unique step IDs
    let mut ids = HashSet::new();
    for step in &workflow.steps {
        if step.id.is_empty() {
            return Err(WorkflowError::Validation(
                "step id must not be empty".to_string(),
            ));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(WorkflowError::DuplicateStepId(step.id.clone()));
        }
    }

    let by_id: HashMap<&str, &StepDefinition> =
        workflow.steps.iter().map(|s| (s.id.as_str(), s)).collect();

    // Parallel containment: a child belongs to exactly one container
    let mut contained: HashMap<&str, &str> = HashMap::new();
    for step in &workflow.steps {
        if let StepConfig::Parallel { children, .. } = &step.config {
            if children.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "parallel step '{}' has no children",
                    step.id
                )));
            }
            for child in children {
                let child_step = by_id.get(child.as_str()).ok_or_else(|| {
                    WorkflowError::UnknownDependency(format!(
                        "parallel step '{}' references unknown child '{}'",
                        step.id, child
                    ))
                })?;
                if !child_step.kind.is_leaf() {
                    return Err(WorkflowError::Validation(format!(
                        "parallel child '{}' must be a leaf step kind, got {:?}",
                        child, child_step.kind
                    )));
                }
                if !child_step.depends_on.is_empty() {
                    return Err(WorkflowError::Validation(format!(
                        "parallel child '{}' must not declare dependencies (the container owns its scheduling)",
                        child
                    )));
                }
                if let Some(existing) = contained.insert(child.as_str(), step.id.as_str()) {
                    return Err(WorkflowError::Validation(format!(
                        "step '{}' is a child of both '{}' and '{}'",
                        child, existing, step.id
                    )));
                }
            }
        }
    }

    for step in &workflow.steps {
        validate_step(step, &by_id, &contained)?;
    }

    Ok(())
}

fn validate_step(
    step: &StepDefinition,
    by_id: &HashMap<&str, &StepDefinition>,
    contained: &HashMap<&str, &str>,
) -> Result<(), WorkflowError> {
    let actual = step.config.kind();
    if step.kind != actual {
        return Err(WorkflowError::KindMismatch {
            step_id: step.id.clone(),
            declared: step.kind,
            actual,
        });
    }

    for dep in &step.depends_on {
        if !by_id.contains_key(dep.as_str()) {
            return Err(WorkflowError::UnknownDependency(format!(
                "step '{}' depends on unknown step '{}'",
                step.id, dep
            )));
        }
        if dep == &step.id {
            return Err(WorkflowError::Validation(format!(
                "step '{}' depends on itself",
                step.id
            )));
        }
    }

    match &step.config {
        StepConfig::Conditional {
            conditions,
            true_step_id,
            false_step_id,
            ..
        } => {
            if conditions.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "conditional step '{}' has no conditions",
                    step.id
                )));
            }
            for target in [true_step_id, false_step_id] {
                if !by_id.contains_key(target.as_str()) {
                    return Err(WorkflowError::UnknownDependency(format!(
                        "conditional step '{}' targets unknown step '{}'",
                        step.id, target
                    )));
                }
                if target == &step.id {
                    return Err(WorkflowError::Validation(format!(
                        "conditional step '{}' targets itself",
                        step.id
                    )));
                }
                if contained.contains_key(target.as_str()) {
                    return Err(WorkflowError::Validation(format!(
                        "conditional step '{}' targets '{}', which is owned by a parallel container",
                        step.id, target
                    )));
                }
            }
        }
        StepConfig::ForEach { template, .. } => {
            if !template.kind.is_leaf() {
                return Err(WorkflowError::Validation(format!(
                    "for_each step '{}' template must be a leaf step kind, got {:?}",
                    step.id, template.kind
                )));
            }
            if !template.depends_on.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "for_each step '{}' template must not declare dependencies",
                    step.id
                )));
            }
            if template.kind != template.config.kind() {
                return Err(WorkflowError::KindMismatch {
                    step_id: template.id.clone(),
                    declared: template.kind,
                    actual: template.config.kind(),
                });
            }
        }
        StepConfig::Wait {
            delay_ms,
            until,
            poll_interval_ms,
            ..
        } => {
            if delay_ms.is_none() && until.is_none() {
                return Err(WorkflowError::Validation(format!(
                    "wait step '{}' must specify delay_ms or until",
                    step.id
                )));
            }
            if until.is_some() && *poll_interval_ms == 0 {
                return Err(WorkflowError::Validation(format!(
                    "wait step '{}' poll_interval_ms must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::Validation { assertions } => {
            if assertions.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "validation step '{}' has no assertions",
                    step.id
                )));
            }
        }
        StepConfig::DataTransform { assignments } => {
            if assignments.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "data_transform step '{}' has no assignments",
                    step.id
                )));
            }
        }
        StepConfig::Parallel { max_concurrency, .. } => {
            if *max_concurrency == Some(0) {
                return Err(WorkflowError::Validation(format!(
                    "parallel step '{}' max_concurrency must be >= 1",
                    step.id
                )));
            }
        }
        StepConfig::HttpRequest { .. } | StepConfig::WebhookCall { .. } => {}
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

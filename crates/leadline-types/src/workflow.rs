//! Workflow domain types for Leadline.
//!
//! Defines the canonical representation of a workflow: an ordered list of
//! step definitions forming a DAG, each carrying a strongly typed
//! configuration for one of the eight step kinds. Retry policy and predicate
//! types used by the engine live here as well.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A named, ordered collection of steps with dependency edges.
///
/// This struct is the single source of truth for a workflow's shape. YAML
/// files and the platform's API both convert to/from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on first save.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Platform category (e.g. "lead-nurture", "scoring", "notification").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Lifecycle status. Only active workflows may be executed.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Static configuration exposed to steps via `{{config.*}}`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, Value>,
    /// How the coordinator reacts to a required step failing.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Maximum steps dispatched concurrently (None = coordinator default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Overall execution deadline in seconds. Expiry behaves like an
    /// external cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    /// Ordered list of step definitions forming the workflow DAG.
    pub steps: Vec<StepDefinition>,
    /// Extensible metadata (for future use / custom integrations).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

/// How the coordinator reacts when a required step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop scheduling new steps after the first required failure.
    /// Already-dispatched independent branches run to completion.
    #[default]
    FailFast,
    /// Independent branches proceed regardless of sibling failures; the
    /// final status reflects whether any required step failed.
    Continue,
}

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

/// A single step in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "score-lead"). Unique within a workflow.
    pub id: String,
    /// Human-readable step name.
    pub name: String,
    /// The kind of step. Must agree with the `config` variant.
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Secondary sort key breaking ties among simultaneously-ready steps.
    #[serde(default)]
    pub order: u32,
    /// Step IDs this step depends on (DAG edges).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// When true, a failure of this step is recorded but does not fail the
    /// execution. Dependents are still skipped (their inputs are missing).
    #[serde(default)]
    pub continue_on_error: bool,
    /// Step-level timeout in milliseconds (None = coordinator default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Kind-specific configuration payload.
    pub config: StepConfig,
}

/// The kind of step in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    HttpRequest,
    DataTransform,
    Conditional,
    Parallel,
    ForEach,
    Wait,
    WebhookCall,
    Validation,
}

impl StepKind {
    /// Container kinds own or gate other steps; leaf kinds do one unit of
    /// work. For-each templates and parallel children must be leaves.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            StepKind::Conditional | StepKind::Parallel | StepKind::ForEach
        )
    }
}

/// Step-specific configuration payload.
///
/// Internally tagged by `type` to match YAML structure:
/// ```yaml
/// config:
///   type: http_request
///   method: POST
///   url: "https://api.example.com/leads/{{input.leadId}}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Call an external HTTP API through the circuit breaker and retry
    /// pipeline. Method, URL, headers, and body are all resolved through
    /// the variable resolver immediately before dispatch.
    HttpRequest {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        /// Circuit breaker key. Defaults to the resolved URL host.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
    /// Pure mapping from existing context fields to new fields. Never
    /// performs I/O; deterministic and idempotent given the same context.
    DataTransform { assignments: Vec<Assignment> },
    /// Branch selection: exactly one of the two targets is scheduled next,
    /// the other (and its exclusive dependents) is skipped.
    Conditional {
        conditions: Vec<Predicate>,
        #[serde(default)]
        mode: PredicateMode,
        true_step_id: String,
        false_step_id: String,
    },
    /// Fan out a named set of child steps concurrently. Children are ids of
    /// steps in the same workflow and are owned by this container -- the
    /// coordinator never schedules them at top level.
    Parallel {
        children: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrency: Option<usize>,
        #[serde(default = "default_true")]
        wait_for_all: bool,
    },
    /// Iterate an array value from context, instantiating the templated
    /// sub-step once per element. Results are collected in input order
    /// regardless of completion order.
    ForEach {
        /// `{{path}}` expression resolving to an array.
        items: String,
        /// Templated sub-step; may reference `{{item...}}` and `{{index}}`.
        template: Box<StepDefinition>,
        #[serde(default)]
        mode: IterationMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrency: Option<usize>,
    },
    /// Suspend until a fixed delay elapses or a polled condition becomes
    /// true, bounded by `max_polls` before failing with a timeout.
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<Vec<Predicate>>,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
        #[serde(default = "default_max_polls")]
        max_polls: u32,
    },
    /// Send a notification to an external URL. With `confirm = false` a
    /// delivery failure is logged and the step succeeds (fire-and-forget);
    /// with `confirm = true` a failure fails the step.
    WebhookCall {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
        #[serde(default)]
        confirm: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry: Option<RetryPolicy>,
    },
    /// Evaluate a list of assertions against context. Every failing
    /// assertion is enumerated in the error, not just the first.
    Validation { assertions: Vec<Assertion> },
}

impl StepConfig {
    /// The step kind this configuration belongs to.
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::HttpRequest { .. } => StepKind::HttpRequest,
            StepConfig::DataTransform { .. } => StepKind::DataTransform,
            StepConfig::Conditional { .. } => StepKind::Conditional,
            StepConfig::Parallel { .. } => StepKind::Parallel,
            StepConfig::ForEach { .. } => StepKind::ForEach,
            StepConfig::Wait { .. } => StepKind::Wait,
            StepConfig::WebhookCall { .. } => StepKind::WebhookCall,
            StepConfig::Validation { .. } => StepKind::Validation,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_polls() -> u32 {
    60
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

// ---------------------------------------------------------------------------
// Data transform
// ---------------------------------------------------------------------------

/// One field assignment in a `DataTransform` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Name of the field in the step's output object.
    pub target: String,
    /// How the value is produced.
    pub value: TransformValue,
}

/// Source of a transformed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformValue {
    /// Copy/rename: the context value at `path`, type preserved.
    Field { path: String },
    /// Format: a string template with `{{path}}` tokens.
    Format { template: String },
    /// A literal JSON value.
    Literal { value: Value },
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// A single comparison against a context field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    /// Context path (same namespaces as the variable resolver).
    pub field: String,
    pub op: ComparisonOp,
    pub value: Value,
}

/// Comparison operators supported by conditional and wait steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

/// Whether all or any predicates must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredicateMode {
    #[default]
    All,
    Any,
}

/// Iteration order for `ForEach` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    #[default]
    Sequential,
    Parallel,
}

// ---------------------------------------------------------------------------
// Validation assertions
// ---------------------------------------------------------------------------

/// One assertion in a `Validation` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Context path the rule applies to.
    pub field: String,
    pub rule: ValidationRule,
    /// Optional human-readable message reported on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The rule an asserted field must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// The field must resolve to a non-null value.
    Required,
    /// The field must compare successfully against `value`.
    Compare { op: ComparisonOp, value: Value },
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential-backoff policy for a single step's external call.
///
/// Attached per `HttpRequest` / `WebhookCall` step, not global. The delay
/// before attempt `n+1` is `min(base_delay_ms * multiplier^(n-1),
/// max_delay_ms)`; jitter (up to 25%) is applied by the retry executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize delays to avoid thundering-herd retries.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Base delay before the attempt following failed attempt `attempt`
    /// (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let base = self.base_delay_ms as f64 * self.multiplier.powi(exp as i32);
        let capped = base.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build a workflow exercising every step kind.
    fn sample_workflow() -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: "lead-enrichment".to_string(),
            description: Some("Enrich, score, and notify on new leads".to_string()),
            category: Some("lead-nurture".to_string()),
            status: WorkflowStatus::Active,
            config: HashMap::from([("crm_base_url".to_string(), json!("https://crm.internal"))]),
            failure_policy: FailurePolicy::FailFast,
            max_concurrency: Some(4),
            deadline_secs: Some(600),
            steps: vec![
                StepDefinition {
                    id: "fetch-lead".to_string(),
                    name: "Fetch Lead".to_string(),
                    kind: StepKind::HttpRequest,
                    order: 0,
                    depends_on: vec![],
                    continue_on_error: false,
                    timeout_ms: Some(10_000),
                    config: StepConfig::HttpRequest {
                        method: "GET".to_string(),
                        url: "{{config.crm_base_url}}/leads/{{input.leadId}}".to_string(),
                        headers: HashMap::new(),
                        body: None,
                        service: Some("crm".to_string()),
                        timeout_ms: None,
                        retry: Some(RetryPolicy::default()),
                    },
                },
                StepDefinition {
                    id: "shape".to_string(),
                    name: "Shape Payload".to_string(),
                    kind: StepKind::DataTransform,
                    order: 1,
                    depends_on: vec!["fetch-lead".to_string()],
                    continue_on_error: false,
                    timeout_ms: None,
                    config: StepConfig::DataTransform {
                        assignments: vec![Assignment {
                            target: "email".to_string(),
                            value: TransformValue::Field {
                                path: "fetch-lead.output.body.email".to_string(),
                            },
                        }],
                    },
                },
                StepDefinition {
                    id: "check-score".to_string(),
                    name: "Check Score".to_string(),
                    kind: StepKind::Conditional,
                    order: 2,
                    depends_on: vec!["shape".to_string()],
                    continue_on_error: false,
                    timeout_ms: None,
                    config: StepConfig::Conditional {
                        conditions: vec![Predicate {
                            field: "fetch-lead.output.body.score".to_string(),
                            op: ComparisonOp::Gte,
                            value: json!(80),
                        }],
                        mode: PredicateMode::All,
                        true_step_id: "notify-sales".to_string(),
                        false_step_id: "queue-nurture".to_string(),
                    },
                },
                StepDefinition {
                    id: "notify-sales".to_string(),
                    name: "Notify Sales".to_string(),
                    kind: StepKind::WebhookCall,
                    order: 3,
                    depends_on: vec![],
                    continue_on_error: false,
                    timeout_ms: None,
                    config: StepConfig::WebhookCall {
                        url: "https://hooks.example.com/sales".to_string(),
                        method: "POST".to_string(),
                        headers: HashMap::new(),
                        payload: Some(json!({"email": "{{shape.output.email}}"})),
                        service: None,
                        confirm: false,
                        retry: None,
                    },
                },
                StepDefinition {
                    id: "queue-nurture".to_string(),
                    name: "Queue Nurture".to_string(),
                    kind: StepKind::Wait,
                    order: 4,
                    depends_on: vec![],
                    continue_on_error: false,
                    timeout_ms: None,
                    config: StepConfig::Wait {
                        delay_ms: Some(500),
                        until: None,
                        poll_interval_ms: 1000,
                        max_polls: 60,
                    },
                },
                StepDefinition {
                    id: "validate".to_string(),
                    name: "Validate Result".to_string(),
                    kind: StepKind::Validation,
                    order: 5,
                    depends_on: vec!["shape".to_string()],
                    continue_on_error: true,
                    timeout_ms: None,
                    config: StepConfig::Validation {
                        assertions: vec![Assertion {
                            field: "shape.output.email".to_string(),
                            rule: ValidationRule::Required,
                            message: None,
                        }],
                    },
                },
            ],
            metadata: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // YAML / JSON roundtrip
    // -----------------------------------------------------------------------

    #[test]
    fn workflow_yaml_roundtrip() {
        let original = sample_workflow();
        let yaml = serde_yaml_ng::to_string(&original).expect("serialize to YAML");

        assert!(yaml.contains("lead-enrichment"));
        assert!(yaml.contains("type: http_request"));
        assert!(yaml.contains("type: conditional"));

        let parsed: Workflow = serde_yaml_ng::from_str(&yaml).expect("deserialize from YAML");
        assert_eq!(parsed.name, "lead-enrichment");
        assert_eq!(parsed.steps.len(), 6);
        assert_eq!(parsed.max_concurrency, Some(4));
        assert_eq!(parsed.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn workflow_json_roundtrip() {
        let original = sample_workflow();
        let json_str = serde_json::to_string_pretty(&original).expect("serialize to JSON");
        let parsed: Workflow = serde_json::from_str(&json_str).expect("deserialize from JSON");
        assert_eq!(parsed.name, original.name);
        assert_eq!(parsed.steps.len(), original.steps.len());
    }

    // -----------------------------------------------------------------------
    // StepConfig variants
    // -----------------------------------------------------------------------

    #[test]
    fn step_config_http_request_serde() {
        let config = StepConfig::HttpRequest {
            method: "POST".to_string(),
            url: "https://api.example.com/leads".to_string(),
            headers: HashMap::from([("Authorization".to_string(), "Bearer xxx".to_string())]),
            body: Some(json!({"email": "{{input.email}}"})),
            service: Some("crm".to_string()),
            timeout_ms: Some(5000),
            retry: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"http_request\""));
        let parsed: StepConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, StepConfig::HttpRequest { .. }));
        assert_eq!(parsed.kind(), StepKind::HttpRequest);
    }

    #[test]
    fn step_config_parallel_defaults() {
        let yaml = r#"
type: parallel
children: [a, b, c]
"#;
        let config: StepConfig = serde_yaml_ng::from_str(yaml).unwrap();
        match config {
            StepConfig::Parallel {
                children,
                max_concurrency,
                wait_for_all,
            } => {
                assert_eq!(children.len(), 3);
                assert_eq!(max_concurrency, None);
                assert!(wait_for_all, "wait_for_all defaults to true");
            }
            other => panic!("expected parallel config, got {other:?}"),
        }
    }

    #[test]
    fn step_config_wait_defaults() {
        let yaml = r#"
type: wait
until:
  - field: "poll.output.status"
    op: eq
    value: done
"#;
        let config: StepConfig = serde_yaml_ng::from_str(yaml).unwrap();
        match config {
            StepConfig::Wait {
                delay_ms,
                until,
                poll_interval_ms,
                max_polls,
            } => {
                assert!(delay_ms.is_none());
                assert_eq!(until.unwrap().len(), 1);
                assert_eq!(poll_interval_ms, 1000);
                assert_eq!(max_polls, 60);
            }
            other => panic!("expected wait config, got {other:?}"),
        }
    }

    #[test]
    fn step_config_webhook_defaults() {
        let yaml = r#"
type: webhook_call
url: "https://hooks.example.com/x"
"#;
        let config: StepConfig = serde_yaml_ng::from_str(yaml).unwrap();
        match config {
            StepConfig::WebhookCall {
                method, confirm, ..
            } => {
                assert_eq!(method, "POST");
                assert!(!confirm, "webhooks default to fire-and-forget");
            }
            other => panic!("expected webhook config, got {other:?}"),
        }
    }

    #[test]
    fn step_config_for_each_serde() {
        let config = StepConfig::ForEach {
            items: "{{input.leads}}".to_string(),
            template: Box::new(StepDefinition {
                id: "notify-one".to_string(),
                name: "Notify One".to_string(),
                kind: StepKind::WebhookCall,
                order: 0,
                depends_on: vec![],
                continue_on_error: false,
                timeout_ms: None,
                config: StepConfig::WebhookCall {
                    url: "https://hooks.example.com/{{item.id}}".to_string(),
                    method: "POST".to_string(),
                    headers: HashMap::new(),
                    payload: None,
                    service: None,
                    confirm: true,
                    retry: None,
                },
            }),
            mode: IterationMode::Parallel,
            max_concurrency: Some(2),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"for_each\""));
        let parsed: StepConfig = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, StepConfig::ForEach { .. }));
    }

    #[test]
    fn step_kind_leaf_classification() {
        assert!(StepKind::HttpRequest.is_leaf());
        assert!(StepKind::DataTransform.is_leaf());
        assert!(StepKind::Wait.is_leaf());
        assert!(StepKind::WebhookCall.is_leaf());
        assert!(StepKind::Validation.is_leaf());
        assert!(!StepKind::Conditional.is_leaf());
        assert!(!StepKind::Parallel.is_leaf());
        assert!(!StepKind::ForEach.is_leaf());
    }

    // -----------------------------------------------------------------------
    // Retry policy
    // -----------------------------------------------------------------------

    #[test]
    fn retry_policy_defaults() {
        let yaml = "{}";
        let policy: RetryPolicy = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 500);
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert!(policy.jitter);
    }

    #[test]
    fn retry_policy_delay_sequence() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_policy_delay_caps_at_max() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 5000,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5000));
    }

    // -----------------------------------------------------------------------
    // Predicates and assertions
    // -----------------------------------------------------------------------

    #[test]
    fn predicate_serde() {
        let pred = Predicate {
            field: "input.score".to_string(),
            op: ComparisonOp::Gte,
            value: json!(80),
        };
        let json = serde_json::to_string(&pred).unwrap();
        assert!(json.contains("\"op\":\"gte\""));
        let parsed: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.op, ComparisonOp::Gte);
    }

    #[test]
    fn validation_rule_serde() {
        let rule = ValidationRule::Compare {
            op: ComparisonOp::Contains,
            value: json!("@"),
        };
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"type\":\"compare\""));
        let parsed: ValidationRule = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ValidationRule::Compare { .. }));

        let required: ValidationRule = serde_json::from_str(r#"{"type":"required"}"#).unwrap();
        assert!(matches!(required, ValidationRule::Required));
    }

    // -----------------------------------------------------------------------
    // Realistic YAML parse
    // -----------------------------------------------------------------------

    #[test]
    fn parse_realistic_yaml_workflow() {
        let yaml = r#"
id: "01938e90-0000-7000-8000-000000000001"
name: lead-scoring
category: scoring
steps:
  - id: fetch
    name: Fetch Lead
    type: http_request
    config:
      type: http_request
      method: GET
      url: "https://crm.internal/leads/{{input.leadId}}"
      service: crm
      retry:
        max_attempts: 4
        base_delay_ms: 100
  - id: branch
    name: Branch On Score
    type: conditional
    depends_on: [fetch]
    config:
      type: conditional
      conditions:
        - field: "fetch.output.body.score"
          op: gt
          value: 50
      true_step_id: hot
      false_step_id: cold
  - id: hot
    name: Hot Path
    type: webhook_call
    config:
      type: webhook_call
      url: "https://hooks.example.com/hot"
  - id: cold
    name: Cold Path
    type: webhook_call
    config:
      type: webhook_call
      url: "https://hooks.example.com/cold"
"#;
        let wf: Workflow = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(wf.name, "lead-scoring");
        assert_eq!(wf.status, WorkflowStatus::Active);
        assert_eq!(wf.steps.len(), 4);
        assert_eq!(wf.steps[1].depends_on, vec!["fetch"]);
        match &wf.steps[0].config {
            StepConfig::HttpRequest { retry, .. } => {
                let retry = retry.as_ref().unwrap();
                assert_eq!(retry.max_attempts, 4);
                assert_eq!(retry.base_delay_ms, 100);
                assert_eq!(retry.multiplier, 2.0); // default
            }
            other => panic!("expected http_request, got {other:?}"),
        }
    }
}

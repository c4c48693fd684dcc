//! Dependency graph builder, cycle detection, and ready-set computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph.
//! Topological sort detects cycles; the coordinator's scheduling loop asks
//! the graph for the current "ready" set on each round instead of
//! precomputing waves, so independent branches keep flowing while slower
//! siblings are still running.
//!
//! Two kinds of implicit structure beyond `depends_on`:
//! - a conditional step gets an edge to each of its two targets, so a branch
//!   target can never start before the branch decision exists;
//! - steps owned by a parallel container are "contained": they appear in the
//!   graph (their statuses matter to dependents) but are never scheduled at
//!   top level -- the container runs them itself.

use std::collections::{HashMap, HashSet};

use leadline_types::execution::StepStatus;
use leadline_types::workflow::{StepConfig, StepDefinition, Workflow};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::definition::WorkflowError;

/// The validated dependency graph of one workflow, built once per execution
/// start. Pure and deterministic; performs no I/O.
#[derive(Debug)]
pub struct ExecutionGraph {
    steps: HashMap<String, StepDefinition>,
    /// Immediate predecessors per step (declared + implicit conditional edges).
    predecessors: HashMap<String, Vec<String>>,
    /// Immediate dependents per step.
    dependents: HashMap<String, Vec<String>>,
    /// Steps owned by a parallel container.
    contained: HashSet<String>,
}

impl ExecutionGraph {
    /// Build and validate the graph for a workflow.
    ///
    /// Fails with `UnknownDependency` for dangling references and
    /// `CycleDetected` when the dependency relation (including implicit
    /// conditional edges) is not acyclic.
    pub fn build(workflow: &Workflow) -> Result<Self, WorkflowError> {
        let id_to_idx: HashMap<&str, usize> = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        // Collect edges: declared depends_on plus implicit conditional->target.
        let mut edges: Vec<(&str, &str)> = Vec::new();
        for step in &workflow.steps {
            for dep in &step.depends_on {
                if !id_to_idx.contains_key(dep.as_str()) {
                    return Err(WorkflowError::UnknownDependency(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.id, dep
                    )));
                }
                edges.push((dep.as_str(), step.id.as_str()));
            }
            if let StepConfig::Conditional {
                true_step_id,
                false_step_id,
                ..
            } = &step.config
            {
                for target in [true_step_id.as_str(), false_step_id.as_str()] {
                    if !id_to_idx.contains_key(target) {
                        return Err(WorkflowError::UnknownDependency(format!(
                            "conditional step '{}' targets unknown step '{}'",
                            step.id, target
                        )));
                    }
                    edges.push((step.id.as_str(), target));
                }
            }
        }

        // Build directed graph: edge from dependency -> dependent
        let mut graph = DiGraph::<&str, ()>::new();
        let node_indices: Vec<_> = workflow
            .steps
            .iter()
            .map(|s| graph.add_node(s.id.as_str()))
            .collect();
        for (from, to) in &edges {
            graph.add_edge(node_indices[id_to_idx[from]], node_indices[id_to_idx[to]], ());
        }

        // Topological sort -- detects cycles
        toposort(&graph, None).map_err(|cycle| {
            let node_id = graph[cycle.node_id()];
            WorkflowError::CycleDetected(format!("cycle detected involving step '{node_id}'"))
        })?;

        let mut predecessors: HashMap<String, Vec<String>> = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), Vec::new()))
            .collect();
        let mut dependents: HashMap<String, Vec<String>> = workflow
            .steps
            .iter()
            .map(|s| (s.id.clone(), Vec::new()))
            .collect();
        for (from, to) in edges {
            predecessors
                .get_mut(to)
                .expect("edge target exists")
                .push(from.to_string());
            dependents
                .get_mut(from)
                .expect("edge source exists")
                .push(to.to_string());
        }

        let mut contained = HashSet::new();
        for step in &workflow.steps {
            if let StepConfig::Parallel { children, .. } = &step.config {
                for child in children {
                    contained.insert(child.clone());
                }
            }
        }

        Ok(Self {
            steps: workflow
                .steps
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect(),
            predecessors,
            dependents,
            contained,
        })
    }

    /// Look up a step definition by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    /// All step ids in the graph (contained children included).
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Whether a step is owned by a parallel container.
    pub fn is_contained(&self, id: &str) -> bool {
        self.contained.contains(id)
    }

    /// Immediate predecessors of a step (declared + implicit edges).
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps that are ready to dispatch: pending, not container-owned, with
    /// every predecessor terminal and successful. Sorted by `order` then id
    /// -- a stable tie-break among simultaneously-ready steps.
    pub fn ready_steps(&self, statuses: &HashMap<String, StepStatus>) -> Vec<&StepDefinition> {
        let mut ready: Vec<&StepDefinition> = self
            .steps
            .values()
            .filter(|step| {
                statuses.get(&step.id) == Some(&StepStatus::Pending)
                    && !self.contained.contains(&step.id)
                    && self.predecessors(&step.id).iter().all(|pred| {
                        statuses.get(pred) == Some(&StepStatus::Succeeded)
                    })
            })
            .collect();
        ready.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        ready
    }

    /// Pending top-level steps that can never run because a predecessor is
    /// failed or skipped. The coordinator marks these skipped, then calls
    /// again -- the cascade reaches transitive dependents in rounds.
    pub fn blocked_steps(&self, statuses: &HashMap<String, StepStatus>) -> Vec<&StepDefinition> {
        self.steps
            .values()
            .filter(|step| {
                statuses.get(&step.id) == Some(&StepStatus::Pending)
                    && !self.contained.contains(&step.id)
                    && self.predecessors(&step.id).iter().any(|pred| {
                        matches!(
                            statuses.get(pred),
                            Some(StepStatus::Failed) | Some(StepStatus::Skipped)
                        )
                    })
            })
            .collect()
    }

    /// Transitive dependents of a step.
    pub fn transitive_dependents(&self, step_id: &str) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut stack = vec![step_id];
        while let Some(current) = stack.pop() {
            if let Some(deps) = self.dependents.get(current) {
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        stack.push(dep.as_str());
                    }
                }
            }
        }
        visited.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Flow validation.
//!
//! Structural checks run against the flow and the tool registry before
//! anything executes.

use std::collections::HashSet;
use std::sync::Arc;

use toolflow_config::{ExecutionStrategy, FlowDefinition};
use toolflow_tool::ToolRegistry;
use tracing::debug;

use crate::error::FlowError;
use crate::graph::Graph;
use crate::plan::ExecutionPlan;

/// Sequential flows with more independent steps than this draw a warning.
const SEQUENTIAL_INDEPENDENT_WARN: usize = 2;

/// Outcome of validating a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
  pub valid: bool,
  pub errors: Vec<FlowError>,
  pub warnings: Vec<String>,
}

/// Validates flow definitions against a tool registry.
#[derive(Debug, Clone)]
pub struct FlowValidator {
  registry: Arc<ToolRegistry>,
}

impl FlowValidator {
  pub fn new(registry: Arc<ToolRegistry>) -> Self {
    Self { registry }
  }

  pub fn registry(&self) -> &Arc<ToolRegistry> {
    &self.registry
  }

  /// Check a flow and collect every error and warning.
  pub fn validate(&self, flow: &FlowDefinition) -> ValidationReport {
    self.check(flow).0
  }

  /// Validate and, when the flow is sound, return its execution plan.
  pub fn validate_for_execution(&self, flow: &FlowDefinition) -> Result<ExecutionPlan, FlowError> {
    let (report, plan) = self.check(flow);
    if let Some(plan) = plan {
      return Ok(plan);
    }

    let mut errors = report.errors;
    if let Some(pos) = errors
      .iter()
      .position(|e| matches!(e, FlowError::CircularDependency { .. }))
    {
      return Err(errors.swap_remove(pos));
    }
    if let Some(pos) = errors
      .iter()
      .position(|e| matches!(e, FlowError::UnknownTool { .. }))
    {
      return Err(errors.swap_remove(pos));
    }
    Err(FlowError::Invalid { errors })
  }

  fn check(&self, flow: &FlowDefinition) -> (ValidationReport, Option<ExecutionPlan>) {
    let mut report = ValidationReport::default();

    if flow.steps.is_empty() {
      report.errors.push(FlowError::EmptyFlow {
        flow_id: flow.flow_id.clone(),
      });
      return (report, None);
    }

    self.check_steps(flow, &mut report.errors);

    let graph = Graph::from_steps(&flow.steps);
    let mut plan = None;
    if let Some(cycle) = graph.find_cycle() {
      report.errors.push(FlowError::CircularDependency { cycle });
    } else {
      match graph.topological_order() {
        Ok(order) => match flow.execution_strategy {
          ExecutionStrategy::Sequential => {
            plan = Some(ExecutionPlan::sequential(&graph, &order));
          }
          ExecutionStrategy::Parallel | ExecutionStrategy::Mixed => {
            match ExecutionPlan::grouped(flow, &graph, &order) {
              Ok(p) => plan = Some(p),
              Err(errors) => report.errors.extend(errors),
            }
          }
        },
        // Unreachable once find_cycle passed, kept as a second line of defense
        Err(cycle) => report.errors.push(FlowError::CircularDependency { cycle }),
      }
    }

    self.collect_warnings(flow, &graph, plan.as_ref(), &mut report.warnings);

    report.valid = report.errors.is_empty();
    debug!(
      flow_id = %flow.flow_id,
      valid = report.valid,
      errors = report.errors.len(),
      warnings = report.warnings.len(),
      "flow_validated"
    );

    let plan = if report.valid {
      plan.map(|p| ExecutionPlan {
        warnings: report.warnings.clone(),
        ..p
      })
    } else {
      None
    };
    (report, plan)
  }

  fn check_steps(&self, flow: &FlowDefinition, errors: &mut Vec<FlowError>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let ids: HashSet<&str> = flow.tool_ids().collect();

    for step in &flow.steps {
      let id = step.tool_id.as_str();
      if !seen.insert(id) {
        errors.push(FlowError::DuplicateStep {
          tool_id: id.to_string(),
        });
        continue;
      }
      if !self.registry.contains(id) {
        errors.push(FlowError::UnknownTool {
          tool_id: id.to_string(),
        });
      }
      if step.timeout_ms == Some(0) {
        errors.push(FlowError::InvalidTimeout {
          tool_id: id.to_string(),
        });
      }
      if step.retry_count == 0 {
        errors.push(FlowError::InvalidRetryCount {
          tool_id: id.to_string(),
        });
      }
      for dep in &step.dependencies {
        if dep == id {
          errors.push(FlowError::SelfDependency {
            tool_id: id.to_string(),
          });
        } else if !ids.contains(dep.as_str()) {
          errors.push(FlowError::UnknownDependency {
            tool_id: id.to_string(),
            dependency: dep.clone(),
          });
        }
      }
    }
  }

  fn collect_warnings(
    &self,
    flow: &FlowDefinition,
    graph: &Graph,
    plan: Option<&ExecutionPlan>,
    warnings: &mut Vec<String>,
  ) {
    match flow.execution_strategy {
      ExecutionStrategy::Sequential => {
        let independent = graph.entry_points().len();
        if independent > SEQUENTIAL_INDEPENDENT_WARN {
          warnings.push(format!(
            "{independent} steps have no dependencies; a parallel or mixed strategy would run them concurrently"
          ));
        }
      }
      ExecutionStrategy::Parallel | ExecutionStrategy::Mixed => {
        if let Some(plan) = plan {
          if plan.groups.len() > 1 && plan.groups.iter().all(|g| g.members.len() == 1) {
            warnings.push(
              "no parallel groups share members; steps will run one group at a time".to_string(),
            );
          }
        }
      }
    }

    if let Some(total) = flow.total_timeout_ms {
      let longest = flow
        .steps
        .iter()
        .filter_map(|step| {
          step.timeout_ms.or_else(|| {
            self
              .registry
              .capabilities(&step.tool_id)
              .ok()
              .map(|caps| caps.default_timeout_ms)
          })
        })
        .max();
      if let Some(longest) = longest.filter(|&l| l > total) {
        warnings.push(format!(
          "total timeout {total}ms is shorter than the longest step timeout {longest}ms"
        ));
      }
    }
  }
}

use serde::{Deserialize, Serialize};

use crate::enums::{AggregationStrategy, ExecutionStrategy, RetryBackoff};
use crate::step::ToolStep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
  pub flow_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub steps: Vec<ToolStep>,
  #[serde(default)]
  pub execution_strategy: ExecutionStrategy,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_timeout_ms: Option<u64>,
  #[serde(default = "FlowDefinition::default_continue_on_error")]
  pub continue_on_error: bool,
  #[serde(default)]
  pub aggregation_strategy: AggregationStrategy,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_backoff: Option<RetryBackoff>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry_initial_delay_ms: Option<u64>,
}

impl FlowDefinition {
  fn default_continue_on_error() -> bool {
    true
  }

  pub fn new(flow_id: impl Into<String>, execution_strategy: ExecutionStrategy) -> Self {
    Self {
      flow_id: flow_id.into(),
      name: None,
      description: None,
      steps: Vec::new(),
      execution_strategy,
      total_timeout_ms: None,
      continue_on_error: Self::default_continue_on_error(),
      aggregation_strategy: AggregationStrategy::default(),
      retry_backoff: None,
      retry_initial_delay_ms: None,
    }
  }

  pub fn with_step(mut self, step: ToolStep) -> Self {
    self.steps.push(step);
    self
  }

  pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
    self.continue_on_error = continue_on_error;
    self
  }

  pub fn with_total_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.total_timeout_ms = Some(timeout_ms);
    self
  }

  /// Get a step by tool id.
  pub fn get_step(&self, tool_id: &str) -> Option<&ToolStep> {
    self.steps.iter().find(|s| s.tool_id == tool_id)
  }

  pub fn tool_ids(&self) -> impl Iterator<Item = &str> {
    self.steps.iter().map(|s| s.tool_id.as_str())
  }
}

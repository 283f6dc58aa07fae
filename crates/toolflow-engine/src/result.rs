use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use toolflow_aggregator::Recommendation;
use toolflow_tool::ToolOutput;

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The step exceeded its time budget.
  Timeout,
  /// The tool raised or panicked.
  Execution,
  /// The tool ran and reported `success = false`.
  Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
  pub tool_id: String,
  pub kind: FailureKind,
  pub message: String,
  pub attempts: u32,
}

/// Everything a flow execution produced, including partial results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowExecutionResult {
  pub execution_id: String,
  pub flow_id: String,
  pub success: bool,
  pub tool_results: BTreeMap<String, ToolOutput>,
  pub aggregated_scores: BTreeMap<String, f64>,
  pub unified_insights: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
  pub combined_recommendations: Vec<Recommendation>,
  pub successful_tools: Vec<String>,
  pub failed_tools: Vec<String>,
  pub skipped_tools: Vec<String>,
  pub step_failures: Vec<StepFailure>,
  pub warnings: Vec<String>,
  pub errors: Vec<String>,
  pub total_duration_ms: u64,
}

impl FlowExecutionResult {
  pub fn failure_of(&self, tool_id: &str) -> Option<&StepFailure> {
    self.step_failures.iter().find(|f| f.tool_id == tool_id)
  }
}

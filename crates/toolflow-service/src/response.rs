use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use toolflow_aggregator::Recommendation;
use toolflow_engine::FlowExecutionResult;

/// A finished analysis as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
  pub execution_id: String,
  pub flow_id: String,
  pub success: bool,
  /// Aggregated metrics, composites and `overall_score`.
  pub scores: BTreeMap<String, f64>,
  /// Raw scores of every tool that succeeded.
  pub tool_scores: BTreeMap<String, BTreeMap<String, f64>>,
  pub insights: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
  pub recommendations: Vec<Recommendation>,
  pub successful_tools: Vec<String>,
  pub failed_tools: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub skipped_tools: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub warnings: Option<Vec<String>>,
  pub duration_ms: u64,
}

impl AnalysisResponse {
  pub fn from_result(result: &FlowExecutionResult) -> Self {
    let tool_scores = result
      .tool_results
      .iter()
      .filter(|(_, output)| output.success)
      .map(|(id, output)| (id.clone(), output.scores.clone()))
      .collect();

    Self {
      execution_id: result.execution_id.clone(),
      flow_id: result.flow_id.clone(),
      success: result.success,
      scores: result.aggregated_scores.clone(),
      tool_scores,
      insights: result.unified_insights.clone(),
      recommendations: result.combined_recommendations.clone(),
      successful_tools: result.successful_tools.clone(),
      failed_tools: result.failed_tools.clone(),
      skipped_tools: result.skipped_tools.clone(),
      errors: non_empty(&result.errors),
      warnings: non_empty(&result.warnings),
      duration_ms: result.total_duration_ms,
    }
  }
}

fn non_empty(items: &[String]) -> Option<Vec<String>> {
  (!items.is_empty()).then(|| items.to_vec())
}

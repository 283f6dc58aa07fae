use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ToolError, ToolValidationError};

/// The payload every tool receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
  pub headline: String,
  pub body_text: String,
  pub cta: String,
  pub platform: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub industry: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_audience: Option<String>,
  /// Tool-specific extras.
  #[serde(default)]
  pub params: serde_json::Value,
}

/// What a single tool produced.
///
/// Domain failures are reported here with `success = false`; the engine stamps
/// `duration_ms` once the call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
  pub tool_id: String,
  pub success: bool,
  #[serde(default)]
  pub scores: BTreeMap<String, f64>,
  #[serde(default)]
  pub insights: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub recommendations: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default)]
  pub duration_ms: u64,
}

impl ToolOutput {
  pub fn success(tool_id: impl Into<String>) -> Self {
    Self {
      tool_id: tool_id.into(),
      success: true,
      scores: BTreeMap::new(),
      insights: serde_json::Map::new(),
      recommendations: Vec::new(),
      error: None,
      duration_ms: 0,
    }
  }

  pub fn failure(tool_id: impl Into<String>, error: impl Into<String>) -> Self {
    Self {
      success: false,
      error: Some(error.into()),
      ..Self::success(tool_id)
    }
  }

  pub fn with_score(mut self, metric: impl Into<String>, value: f64) -> Self {
    self.scores.insert(metric.into(), value);
    self
  }

  pub fn with_insight(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.insights.insert(key.into(), value);
    self
  }

  pub fn with_recommendation(mut self, text: impl Into<String>) -> Self {
    self.recommendations.push(text.into());
    self
  }

  pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
    self.duration_ms = duration_ms;
    self
  }
}

/// Static description of a tool: its metrics, how they weigh and where they roll up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCapabilities {
  pub name: String,
  #[serde(default)]
  pub output_metrics: Vec<String>,
  pub default_timeout_ms: u64,
  /// Per-metric weight used by weighted aggregation. Missing metrics weigh 1.0.
  #[serde(default)]
  pub metric_weights: BTreeMap<String, f64>,
  /// Category each metric contributes to (e.g. `clarity -> content`).
  #[serde(default)]
  pub metric_categories: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub recommendation_category: Option<String>,
}

impl ToolCapabilities {
  pub fn new(name: impl Into<String>, default_timeout_ms: u64) -> Self {
    Self {
      name: name.into(),
      output_metrics: Vec::new(),
      default_timeout_ms,
      metric_weights: BTreeMap::new(),
      metric_categories: BTreeMap::new(),
      recommendation_category: None,
    }
  }

  /// Declare a metric with its weight and optional category.
  pub fn with_metric(mut self, metric: impl Into<String>, weight: f64, category: Option<&str>) -> Self {
    let metric = metric.into();
    if let Some(category) = category {
      self.metric_categories.insert(metric.clone(), category.to_string());
    }
    self.metric_weights.insert(metric.clone(), weight);
    self.output_metrics.push(metric);
    self
  }

  pub fn with_recommendation_category(mut self, category: impl Into<String>) -> Self {
    self.recommendation_category = Some(category.into());
    self
  }

  pub fn weight(&self, metric: &str) -> f64 {
    self.metric_weights.get(metric).copied().unwrap_or(1.0)
  }

  pub fn category(&self, metric: &str) -> Option<&str> {
    self.metric_categories.get(metric).map(String::as_str)
  }
}

/// An analysis plugin.
///
/// `run` returns `Err` only for infrastructure faults; a tool that analyzed the
/// input and found a problem returns `Ok` with `success = false`.
#[async_trait]
pub trait Tool: Send + Sync {
  fn capabilities(&self) -> ToolCapabilities;

  /// Reject input the tool cannot work with. Called before any tool in the flow runs.
  fn validate(&self, _input: &ToolInput) -> Result<(), ToolValidationError> {
    Ok(())
  }

  /// Analyze the input. `timeout` is the budget the engine will enforce.
  async fn run(&self, input: &ToolInput, timeout: Duration) -> Result<ToolOutput, ToolError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_weight_defaults_to_one() {
    let caps = ToolCapabilities::new("clarity", 1_000).with_metric("clarity", 0.4, Some("content"));
    assert_eq!(caps.weight("clarity"), 0.4);
    assert_eq!(caps.weight("unknown"), 1.0);
    assert_eq!(caps.category("clarity"), Some("content"));
    assert_eq!(caps.output_metrics, vec!["clarity".to_string()]);
  }

  #[test]
  fn test_failure_output() {
    let out = ToolOutput::failure("cta", "no call to action").with_duration_ms(12);
    assert!(!out.success);
    assert_eq!(out.error.as_deref(), Some("no call to action"));
    assert_eq!(out.duration_ms, 12);
  }
}

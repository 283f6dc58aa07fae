use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One tool invocation within a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStep {
  /// Registry id of the tool; also the step's identity within the flow.
  pub tool_id: String,

  /// Steps that must finish before this one starts.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub dependencies: BTreeSet<String>,

  /// Steps sharing a group id are launched together.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parallel_group: Option<String>,

  /// A failing required step halts the flow and fails the execution.
  #[serde(default)]
  pub required: bool,

  /// Overrides the tool's declared default timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,

  /// Total number of attempts, at least 1.
  #[serde(default = "ToolStep::default_retry_count")]
  pub retry_count: u32,
}

impl ToolStep {
  fn default_retry_count() -> u32 {
    1
  }

  pub fn new(tool_id: impl Into<String>) -> Self {
    Self {
      tool_id: tool_id.into(),
      dependencies: BTreeSet::new(),
      parallel_group: None,
      required: false,
      timeout_ms: None,
      retry_count: Self::default_retry_count(),
    }
  }

  pub fn depends_on(mut self, tool_id: impl Into<String>) -> Self {
    self.dependencies.insert(tool_id.into());
    self
  }

  pub fn in_group(mut self, group: impl Into<String>) -> Self {
    self.parallel_group = Some(group.into());
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
    self.timeout_ms = Some(timeout_ms);
    self
  }

  pub fn with_retries(mut self, retry_count: u32) -> Self {
    self.retry_count = retry_count;
    self
  }
}

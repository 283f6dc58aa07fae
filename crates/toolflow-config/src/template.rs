use serde::{Deserialize, Serialize};

use crate::flow::FlowDefinition;

/// A named, reusable flow kept apart from custom flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(default)]
  pub usage_count: u64,
  pub flow: FlowDefinition,
}

impl FlowTemplate {
  pub fn new(name: impl Into<String>, flow: FlowDefinition) -> Self {
    Self {
      name: name.into(),
      description: String::new(),
      tags: Vec::new(),
      usage_count: 0,
      flow,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
    self.tags.push(tag.into());
    self
  }
}

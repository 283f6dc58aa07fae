use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::FlowDefinition;

/// Bookkeeping attached to a flow when it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMetadata {
  pub saved_at: DateTime<Utc>,
  pub author: String,
  pub category: String,
  /// Starts at 1 and increments on every save of the same flow id.
  pub version: u32,
}

/// A flow definition as it appears on disk: the flow fields plus `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
  #[serde(flatten)]
  pub flow: FlowDefinition,
  pub metadata: FlowMetadata,
}

impl FlowDocument {
  pub fn new(flow: FlowDefinition, metadata: FlowMetadata) -> Self {
    Self { flow, metadata }
  }
}

use async_trait::async_trait;
use toolflow_config::{ChangeRecord, ConfigFormat, FlowDocument, FlowTemplate};

use crate::error::StoreError;

/// A persisted flow together with the format it was written in.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFlow {
  pub document: FlowDocument,
  pub format: ConfigFormat,
}

/// Storage backend for flows, their change history and templates.
///
/// Custom flows and templates live in separate namespaces, so a template may
/// share a name with a flow id.
#[async_trait]
pub trait FlowStore: Send + Sync {
  async fn read_flow(&self, flow_id: &str) -> Result<Option<StoredFlow>, StoreError>;

  /// Write a flow, replacing any previous copy in any format.
  async fn write_flow(&self, document: &FlowDocument, format: ConfigFormat) -> Result<(), StoreError>;

  /// Returns `false` if there was nothing to delete.
  async fn delete_flow(&self, flow_id: &str) -> Result<bool, StoreError>;

  /// Ids of every stored flow, sorted.
  async fn list_flows(&self) -> Result<Vec<String>, StoreError>;

  /// History records oldest first; empty if none were written.
  async fn read_history(&self, flow_id: &str) -> Result<Vec<ChangeRecord>, StoreError>;

  async fn write_history(&self, flow_id: &str, history: &[ChangeRecord]) -> Result<(), StoreError>;

  async fn read_template(&self, name: &str) -> Result<Option<FlowTemplate>, StoreError>;

  async fn write_template(&self, template: &FlowTemplate) -> Result<(), StoreError>;

  async fn delete_template(&self, name: &str) -> Result<bool, StoreError>;

  /// Every stored template, sorted by name.
  async fn list_templates(&self) -> Result<Vec<FlowTemplate>, StoreError>;
}

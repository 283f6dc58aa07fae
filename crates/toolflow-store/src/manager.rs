use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use toolflow_config::{
  ChangeRecord, ChangeType, ConfigFormat, FlowDefinition, FlowDocument, FlowMetadata, FlowTemplate,
};
use toolflow_flow::{FlowValidator, ValidationReport};
use toolflow_tool::ToolRegistry;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::FlowStore;

/// Category used for imported flows that carry no metadata.
pub const DEFAULT_CATEGORY: &str = "custom";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Change records kept per flow; older ones are dropped.
  pub history_limit: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { history_limit: 50 }
  }
}

/// A flow file being imported. Metadata is optional so hand-written flows can
/// be imported as well as exported documents.
#[derive(Deserialize)]
struct ImportedFlow {
  #[serde(flatten)]
  flow: FlowDefinition,
  #[serde(default)]
  metadata: Option<FlowMetadata>,
}

/// Versioned persistence of flow definitions, their history and templates.
///
/// Every mutating flow operation appends one [`ChangeRecord`]. Flow mutations
/// are serialized through an internal lock so version numbers and history
/// appends never interleave. Template writes, including the usage count bumped
/// by [`use_template`](Self::use_template), take a separate lock, so resolving
/// a template never waits on flow saves.
pub struct FlowConfigManager<S: FlowStore> {
  store: S,
  validator: FlowValidator,
  history_limit: usize,
  write_lock: Mutex<()>,
  template_lock: Mutex<()>,
}

impl<S: FlowStore> FlowConfigManager<S> {
  pub fn new(store: S, registry: Arc<ToolRegistry>, config: StoreConfig) -> Self {
    Self {
      store,
      validator: FlowValidator::new(registry),
      history_limit: config.history_limit,
      write_lock: Mutex::new(()),
      template_lock: Mutex::new(()),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn history_limit(&self) -> usize {
    self.history_limit
  }

  pub fn validate(&self, flow: &FlowDefinition) -> ValidationReport {
    self.validator.validate(flow)
  }

  /// Validate and persist a flow, bumping its version if it already exists.
  pub async fn save(
    &self,
    flow: FlowDefinition,
    category: &str,
    format: ConfigFormat,
    author: &str,
  ) -> Result<FlowDocument, StoreError> {
    self.check(&flow)?;
    let _guard = self.write_lock.lock().await;
    self.persist(flow, category, format, author, None).await
  }

  pub async fn load(&self, flow_id: &str) -> Result<FlowDefinition, StoreError> {
    Ok(self.load_document(flow_id).await?.flow)
  }

  /// Load a flow together with its metadata.
  pub async fn load_document(&self, flow_id: &str) -> Result<FlowDocument, StoreError> {
    self
      .store
      .read_flow(flow_id)
      .await?
      .map(|stored| stored.document)
      .ok_or_else(|| StoreError::NotFound {
        flow_id: flow_id.to_string(),
      })
  }

  /// Copy a flow under a new id. The copy starts at version 1 with its own history.
  pub async fn duplicate(&self, flow_id: &str, new_id: &str, author: &str) -> Result<FlowDocument, StoreError> {
    let _guard = self.write_lock.lock().await;

    let source = self.store.read_flow(flow_id).await?.ok_or_else(|| StoreError::NotFound {
      flow_id: flow_id.to_string(),
    })?;
    if self.store.read_flow(new_id).await?.is_some() {
      return Err(StoreError::AlreadyExists {
        flow_id: new_id.to_string(),
      });
    }

    let mut flow = source.document.flow;
    flow.flow_id = new_id.to_string();
    let document = FlowDocument::new(
      flow,
      FlowMetadata {
        saved_at: Utc::now(),
        author: author.to_string(),
        category: source.document.metadata.category,
        version: 1,
      },
    );
    self.store.write_flow(&document, source.format).await?;
    self
      .append_history(
        new_id,
        ChangeRecord::now(ChangeType::Duplicated, author, format!("duplicated from '{flow_id}'")),
      )
      .await?;

    info!(flow_id = %flow_id, new_id = %new_id, "flow_duplicated");
    Ok(document)
  }

  /// Remove a flow. Its history is kept and gains a deletion record.
  pub async fn delete(&self, flow_id: &str, author: &str) -> Result<(), StoreError> {
    let _guard = self.write_lock.lock().await;

    if !self.store.delete_flow(flow_id).await? {
      return Err(StoreError::NotFound {
        flow_id: flow_id.to_string(),
      });
    }
    self
      .append_history(flow_id, ChangeRecord::now(ChangeType::Deleted, author, "flow deleted"))
      .await?;

    info!(flow_id = %flow_id, "flow_deleted");
    Ok(())
  }

  /// Write a stored flow to `path`, encoded according to the file extension.
  pub async fn export(&self, flow_id: &str, path: &Path) -> Result<(), StoreError> {
    let format = ConfigFormat::from_path(path)?;
    let document = self.load_document(flow_id).await?;
    let content = format.render(&document)?;

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await?;

    info!(flow_id = %flow_id, path = %path.display(), "flow_exported");
    Ok(())
  }

  /// Read a flow file, re-validate it and store it under its own flow id.
  pub async fn import(&self, path: &Path, author: &str) -> Result<FlowDocument, StoreError> {
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).await?;
    let imported: ImportedFlow = format.parse(&content)?;
    self.check(&imported.flow)?;

    let category = imported
      .metadata
      .map(|m| m.category)
      .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let description = format!("imported from {}", path.display());

    let _guard = self.write_lock.lock().await;
    self
      .persist(imported.flow, &category, format, author, Some((ChangeType::Imported, description)))
      .await
  }

  /// Change records for a flow, oldest first.
  pub async fn history(&self, flow_id: &str) -> Result<Vec<ChangeRecord>, StoreError> {
    self.store.read_history(flow_id).await
  }

  /// Ids of all stored custom flows.
  pub async fn list(&self) -> Result<Vec<String>, StoreError> {
    self.store.list_flows().await
  }

  pub async fn save_template(&self, template: FlowTemplate) -> Result<(), StoreError> {
    self.check(&template.flow)?;
    let _guard = self.template_lock.lock().await;
    self.store.write_template(&template).await?;
    info!(template = %template.name, "template_saved");
    Ok(())
  }

  pub async fn load_template(&self, name: &str) -> Result<FlowTemplate, StoreError> {
    self
      .store
      .read_template(name)
      .await?
      .ok_or_else(|| StoreError::TemplateNotFound { name: name.to_string() })
  }

  /// Fetch a template's flow and count the use.
  ///
  /// The read-increment-write of the count is serialized per manager, so
  /// concurrent uses of templates queue behind each other for one small file
  /// write but never behind flow mutations.
  pub async fn use_template(&self, name: &str) -> Result<FlowDefinition, StoreError> {
    let _guard = self.template_lock.lock().await;
    let mut template = self.load_template(name).await?;
    template.usage_count += 1;
    self.store.write_template(&template).await?;
    debug!(template = %name, usage_count = template.usage_count, "template_used");
    Ok(template.flow)
  }

  pub async fn list_templates(&self) -> Result<Vec<FlowTemplate>, StoreError> {
    self.store.list_templates().await
  }

  pub async fn delete_template(&self, name: &str) -> Result<(), StoreError> {
    let _guard = self.template_lock.lock().await;
    if !self.store.delete_template(name).await? {
      return Err(StoreError::TemplateNotFound { name: name.to_string() });
    }
    info!(template = %name, "template_deleted");
    Ok(())
  }

  fn check(&self, flow: &FlowDefinition) -> Result<(), StoreError> {
    let report = self.validator.validate(flow);
    if report.valid {
      return Ok(());
    }
    Err(StoreError::Invalid {
      flow_id: flow.flow_id.clone(),
      errors: report.errors.iter().map(ToString::to_string).collect(),
    })
  }

  /// Write a new version of a flow. Callers hold the write lock.
  async fn persist(
    &self,
    flow: FlowDefinition,
    category: &str,
    format: ConfigFormat,
    author: &str,
    change: Option<(ChangeType, String)>,
  ) -> Result<FlowDocument, StoreError> {
    let previous = self.store.read_flow(&flow.flow_id).await?;
    let version = previous.as_ref().map_or(1, |p| p.document.metadata.version + 1);

    let (change_type, description) = change.unwrap_or_else(|| match previous {
      Some(_) => (ChangeType::Updated, format!("saved version {version}")),
      None => (ChangeType::Created, "flow created".to_string()),
    });

    let document = FlowDocument::new(
      flow,
      FlowMetadata {
        saved_at: Utc::now(),
        author: author.to_string(),
        category: category.to_string(),
        version,
      },
    );
    self.store.write_flow(&document, format).await?;
    self
      .append_history(&document.flow.flow_id, ChangeRecord::now(change_type, author, description))
      .await?;

    info!(
      flow_id = %document.flow.flow_id,
      version,
      format = %format,
      change = ?change_type,
      "flow_saved"
    );
    Ok(document)
  }

  async fn append_history(&self, flow_id: &str, record: ChangeRecord) -> Result<(), StoreError> {
    let mut history = self.store.read_history(flow_id).await?;
    history.push(record);
    if history.len() > self.history_limit {
      let excess = history.len() - self.history_limit;
      history.drain(..excess);
    }
    self.store.write_history(flow_id, &history).await
  }
}

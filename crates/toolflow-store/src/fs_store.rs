use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use toolflow_config::{ChangeRecord, ConfigFormat, FlowDocument, FlowTemplate};

use crate::error::StoreError;
use crate::store::{FlowStore, StoredFlow};

const FLOWS_DIR: &str = "flows";
const TEMPLATES_DIR: &str = "templates";
const HISTORY_DIR: &str = "history";

/// Filesystem-based flow store.
///
/// ```text
/// {root}/
/// ├── flows/
/// │   ├── headline-check.json
/// │   └── social-post.yaml
/// ├── templates/
/// │   └── quick.json
/// └── history/
///     └── headline-check.json
/// ```
pub struct FsFlowStore {
  root: PathBuf,
}

impl FsFlowStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Ids become file names, so they must be a single plain path segment.
  fn check_id(id: &str) -> Result<(), StoreError> {
    let bad = id.is_empty()
      || id.starts_with('.')
      || id.contains(['/', '\\', '\0'])
      || id.chars().any(char::is_control);
    if bad {
      return Err(StoreError::InvalidId { id: id.to_string() });
    }
    Ok(())
  }

  fn flow_path(&self, flow_id: &str, ext: &str) -> PathBuf {
    self.root.join(FLOWS_DIR).join(format!("{flow_id}.{ext}"))
  }

  fn template_path(&self, name: &str) -> PathBuf {
    self.root.join(TEMPLATES_DIR).join(format!("{name}.json"))
  }

  fn history_path(&self, flow_id: &str) -> PathBuf {
    self.root.join(HISTORY_DIR).join(format!("{flow_id}.json"))
  }

  /// Existing flow files for an id, in lookup order.
  async fn existing_flow_files(&self, flow_id: &str) -> Result<Vec<(PathBuf, ConfigFormat)>, StoreError> {
    let mut found = Vec::new();
    for ext in ["json", "yaml", "yml"] {
      let path = self.flow_path(flow_id, ext);
      if fs::try_exists(&path).await? {
        let format = ConfigFormat::from_path(&path)?;
        found.push((path, format));
      }
    }
    Ok(found)
  }
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
  match fs::read_to_string(path).await {
    Ok(content) => Ok(Some(content)),
    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

async fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).await?;
  }
  fs::write(path, content).await?;
  Ok(())
}

async fn remove_optional(path: &Path) -> Result<bool, StoreError> {
  match fs::remove_file(path).await {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e.into()),
  }
}

/// File stems in a directory with one of the given extensions, sorted.
async fn list_stems(dir: &Path, extensions: &[&str]) -> Result<Vec<String>, StoreError> {
  let mut stems = Vec::new();
  if !fs::try_exists(dir).await? {
    return Ok(stems);
  }

  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    let matches_ext = path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| extensions.contains(&e));
    if matches_ext && let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
      stems.push(stem.to_string());
    }
  }

  stems.sort();
  stems.dedup();
  Ok(stems)
}

#[async_trait]
impl FlowStore for FsFlowStore {
  async fn read_flow(&self, flow_id: &str) -> Result<Option<StoredFlow>, StoreError> {
    Self::check_id(flow_id)?;
    let Some((path, format)) = self.existing_flow_files(flow_id).await?.into_iter().next() else {
      return Ok(None);
    };
    let Some(content) = read_optional(&path).await? else {
      return Ok(None);
    };
    let document: FlowDocument = format.parse(&content)?;
    Ok(Some(StoredFlow { document, format }))
  }

  async fn write_flow(&self, document: &FlowDocument, format: ConfigFormat) -> Result<(), StoreError> {
    let flow_id = &document.flow.flow_id;
    Self::check_id(flow_id)?;

    let content = format.render(document)?;
    let target = self.flow_path(flow_id, format.extension());
    write_file(&target, &content).await?;

    // Drop copies left behind in another format
    for (path, _) in self.existing_flow_files(flow_id).await? {
      if path != target {
        remove_optional(&path).await?;
      }
    }
    Ok(())
  }

  async fn delete_flow(&self, flow_id: &str) -> Result<bool, StoreError> {
    Self::check_id(flow_id)?;
    let mut removed = false;
    for (path, _) in self.existing_flow_files(flow_id).await? {
      removed |= remove_optional(&path).await?;
    }
    Ok(removed)
  }

  async fn list_flows(&self) -> Result<Vec<String>, StoreError> {
    list_stems(&self.root.join(FLOWS_DIR), &["json", "yaml", "yml"]).await
  }

  async fn read_history(&self, flow_id: &str) -> Result<Vec<ChangeRecord>, StoreError> {
    Self::check_id(flow_id)?;
    match read_optional(&self.history_path(flow_id)).await? {
      Some(content) => Ok(ConfigFormat::Json.parse(&content)?),
      None => Ok(Vec::new()),
    }
  }

  async fn write_history(&self, flow_id: &str, history: &[ChangeRecord]) -> Result<(), StoreError> {
    Self::check_id(flow_id)?;
    let content = ConfigFormat::Json.render(&history)?;
    write_file(&self.history_path(flow_id), &content).await
  }

  async fn read_template(&self, name: &str) -> Result<Option<FlowTemplate>, StoreError> {
    Self::check_id(name)?;
    match read_optional(&self.template_path(name)).await? {
      Some(content) => Ok(Some(ConfigFormat::Json.parse(&content)?)),
      None => Ok(None),
    }
  }

  async fn write_template(&self, template: &FlowTemplate) -> Result<(), StoreError> {
    Self::check_id(&template.name)?;
    let content = ConfigFormat::Json.render(template)?;
    write_file(&self.template_path(&template.name), &content).await
  }

  async fn delete_template(&self, name: &str) -> Result<bool, StoreError> {
    Self::check_id(name)?;
    remove_optional(&self.template_path(name)).await
  }

  async fn list_templates(&self) -> Result<Vec<FlowTemplate>, StoreError> {
    let mut templates = Vec::new();
    for name in list_stems(&self.root.join(TEMPLATES_DIR), &["json"]).await? {
      if let Some(template) = self.read_template(&name).await? {
        templates.push(template);
      }
    }
    Ok(templates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_check_id() {
    assert!(FsFlowStore::check_id("headline-check_v2").is_ok());
    for bad in ["", "../etc", "a/b", ".hidden", "a\\b"] {
      assert!(
        matches!(FsFlowStore::check_id(bad), Err(StoreError::InvalidId { .. })),
        "{bad} accepted"
      );
    }
  }
}

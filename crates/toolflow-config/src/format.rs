use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// On-disk encoding of flow documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
  #[default]
  Json,
  Yaml,
}

impl ConfigFormat {
  /// Pick the format from a file extension (`.json`, `.yaml`, `.yml`).
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
      Some("json") => Ok(ConfigFormat::Json),
      Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
      _ => Err(ConfigError::UnsupportedFormat {
        path: path.display().to_string(),
      }),
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      ConfigFormat::Json => "json",
      ConfigFormat::Yaml => "yaml",
    }
  }

  pub fn parse<T: DeserializeOwned>(&self, content: &str) -> Result<T, ConfigError> {
    match self {
      ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
        format: *self,
        message: e.to_string(),
      }),
      ConfigFormat::Yaml => serde_yaml_bw::from_str(content).map_err(|e| ConfigError::Parse {
        format: *self,
        message: e.to_string(),
      }),
    }
  }

  pub fn render<T: Serialize>(&self, value: &T) -> Result<String, ConfigError> {
    match self {
      ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(|e| ConfigError::Render {
        format: *self,
        message: e.to_string(),
      }),
      ConfigFormat::Yaml => serde_yaml_bw::to_string(value).map_err(|e| ConfigError::Render {
        format: *self,
        message: e.to_string(),
      }),
    }
  }
}

impl std::fmt::Display for ConfigFormat {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.extension())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ExecutionStrategy, FlowDefinition, ToolStep};

  #[test]
  fn test_from_path() {
    assert_eq!(ConfigFormat::from_path(Path::new("a/b.json")).unwrap(), ConfigFormat::Json);
    assert_eq!(ConfigFormat::from_path(Path::new("b.YML")).unwrap(), ConfigFormat::Yaml);
    assert!(matches!(
      ConfigFormat::from_path(Path::new("flow.toml")),
      Err(ConfigError::UnsupportedFormat { .. })
    ));
  }

  #[test]
  fn test_yaml_defaults_applied() {
    let yaml = "flow_id: basic\nsteps:\n  - tool_id: sentiment\n";
    let flow: FlowDefinition = ConfigFormat::Yaml.parse(yaml).unwrap();
    assert_eq!(flow.execution_strategy, ExecutionStrategy::Sequential);
    assert!(flow.continue_on_error);
    assert_eq!(flow.steps, vec![ToolStep::new("sentiment")]);
  }

  #[test]
  fn test_parse_error_carries_format() {
    let err = ConfigFormat::Json.parse::<FlowDefinition>("{").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Json, .. }));
  }
}

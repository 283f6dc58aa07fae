use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toolflow_aggregator::AggregatorConfig;
use toolflow_engine::EngineConfig;
use toolflow_service::ServiceConfig;
use toolflow_store::StoreConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Contents of `<data_dir>/config.toml`. Every section is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub log_level: String,
  pub engine: EngineSettings,
  pub aggregator: AggregatorConfig,
  pub store: StoreConfig,
  pub service: ServiceConfig,
  /// Per-tool factory config, keyed by tool id.
  pub tools: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  pub default_step_timeout_ms: u64,
  pub tracker_retention: usize,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      engine: EngineSettings::default(),
      aggregator: AggregatorConfig::default(),
      store: StoreConfig::default(),
      service: ServiceConfig::default(),
      tools: BTreeMap::new(),
    }
  }
}

impl Default for EngineSettings {
  fn default() -> Self {
    let engine = EngineConfig::default();
    Self {
      default_step_timeout_ms: engine.default_step_timeout_ms,
      tracker_retention: engine.tracker_retention,
    }
  }
}

impl Settings {
  /// Read settings from `path`; a missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let contents =
      std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      default_step_timeout_ms: self.engine.default_step_timeout_ms,
      tracker_retention: self.engine.tracker_retention,
      aggregator: self.aggregator.clone(),
    }
  }
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .try_init()
    .ok();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("config.toml")).unwrap();
    assert_eq!(settings, Settings::default());
  }

  #[test]
  fn test_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
      &path,
      r#"
log_level = "debug"

[engine]
default_step_timeout_ms = 5000

[aggregator.category_weights]
content = 0.6
compliance = 0.4

[store]
history_limit = 10

[service]
default_template = "quick"

[service.analysis_types]
full = "comprehensive"

[tools.text-length]
min_words = 3
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.log_level, "debug");
    assert_eq!(settings.engine.default_step_timeout_ms, 5000);
    assert_eq!(settings.engine.tracker_retention, 100);
    assert_eq!(settings.store.history_limit, 10);
    assert_eq!(settings.service.default_template, "quick");
    assert_eq!(settings.service.analysis_types["full"], "comprehensive");
    assert_eq!(settings.service.cache_ttl_ms, ServiceConfig::default().cache_ttl_ms);
    assert_eq!(settings.tools["text-length"]["min_words"], 3);

    let engine = settings.engine_config();
    assert_eq!(engine.aggregator.category_weights["content"], 0.6);
    assert!(engine.aggregator.validate().is_ok());
  }
}

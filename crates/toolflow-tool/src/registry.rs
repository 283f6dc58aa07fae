//! Tool registry.
//!
//! Tools are registered as factories and instantiated on first use. The
//! instance is cached so every later lookup shares it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::RegistryError;
use crate::tool::{Tool, ToolCapabilities};

/// Builds a tool from its registration config.
pub type ToolFactory =
  Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Tool>, RegistryError> + Send + Sync>;

struct Registration {
  factory: ToolFactory,
  config: serde_json::Value,
  instance: Option<Arc<dyn Tool>>,
}

/// Registry of tool factories keyed by tool id.
#[derive(Default)]
pub struct ToolRegistry {
  tools: RwLock<HashMap<String, Registration>>,
}

impl ToolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a tool factory. Fails if the id is taken.
  pub fn register<F>(
    &self,
    tool_id: impl Into<String>,
    factory: F,
    config: serde_json::Value,
  ) -> Result<(), RegistryError>
  where
    F: Fn(&serde_json::Value) -> Result<Arc<dyn Tool>, RegistryError> + Send + Sync + 'static,
  {
    self.register_with(tool_id, factory, config, false)
  }

  /// Register a tool factory, optionally replacing an existing registration.
  ///
  /// Replacing drops any cached instance of the previous tool.
  pub fn register_with<F>(
    &self,
    tool_id: impl Into<String>,
    factory: F,
    config: serde_json::Value,
    replace: bool,
  ) -> Result<(), RegistryError>
  where
    F: Fn(&serde_json::Value) -> Result<Arc<dyn Tool>, RegistryError> + Send + Sync + 'static,
  {
    let tool_id = tool_id.into();
    let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());

    if tools.contains_key(&tool_id) && !replace {
      return Err(RegistryError::AlreadyRegistered { tool_id });
    }

    debug!(tool_id = %tool_id, replace, "tool_registered");
    tools.insert(
      tool_id,
      Registration {
        factory: Arc::new(factory),
        config,
        instance: None,
      },
    );
    Ok(())
  }

  /// Register an already-built tool instance.
  pub fn register_instance(
    &self,
    tool_id: impl Into<String>,
    tool: Arc<dyn Tool>,
  ) -> Result<(), RegistryError> {
    self.register(tool_id, move |_| Ok(tool.clone()), serde_json::Value::Null)
  }

  /// Get a tool, instantiating it on first access.
  pub fn get(&self, tool_id: &str) -> Result<Arc<dyn Tool>, RegistryError> {
    // Fast path: instance already built
    let (factory, config) = {
      let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
      let registration = tools
        .get(tool_id)
        .ok_or_else(|| RegistryError::NotRegistered {
          tool_id: tool_id.to_string(),
        })?;
      if let Some(instance) = &registration.instance {
        return Ok(instance.clone());
      }
      (registration.factory.clone(), registration.config.clone())
    };

    // Build outside the lock, then keep whichever instance landed first
    let built = factory(&config)?;

    let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
    let registration = tools
      .get_mut(tool_id)
      .ok_or_else(|| RegistryError::NotRegistered {
        tool_id: tool_id.to_string(),
      })?;
    if !Arc::ptr_eq(&registration.factory, &factory) {
      // Replaced while we were building; the new registration wins
      drop(tools);
      return self.get(tool_id);
    }
    let instance = registration.instance.get_or_insert(built).clone();
    debug!(tool_id = %tool_id, "tool_instantiated");
    Ok(instance)
  }

  pub fn capabilities(&self, tool_id: &str) -> Result<ToolCapabilities, RegistryError> {
    Ok(self.get(tool_id)?.capabilities())
  }

  /// Registered tool ids, sorted.
  pub fn list(&self) -> Vec<String> {
    let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
    let mut ids: Vec<String> = tools.keys().cloned().collect();
    ids.sort();
    ids
  }

  pub fn contains(&self, tool_id: &str) -> bool {
    let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
    tools.contains_key(tool_id)
  }

  pub fn unregister(&self, tool_id: &str) -> Result<(), RegistryError> {
    let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
    tools
      .remove(tool_id)
      .map(|_| ())
      .ok_or_else(|| RegistryError::NotRegistered {
        tool_id: tool_id.to_string(),
      })
  }
}

impl std::fmt::Debug for ToolRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ToolRegistry")
      .field("tools", &self.list())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;

  use super::*;
  use crate::error::ToolError;
  use crate::tool::{ToolInput, ToolOutput};

  struct Echo {
    name: String,
  }

  #[async_trait]
  impl Tool for Echo {
    fn capabilities(&self) -> ToolCapabilities {
      ToolCapabilities::new(self.name.clone(), 1_000)
    }

    async fn run(&self, _input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
      Ok(ToolOutput::success(self.name.clone()))
    }
  }

  fn counting_factory(
    counter: Arc<AtomicUsize>,
  ) -> impl Fn(&serde_json::Value) -> Result<Arc<dyn Tool>, RegistryError> + Send + Sync + 'static {
    move |config: &serde_json::Value| {
      counter.fetch_add(1, Ordering::SeqCst);
      let name = config["name"].as_str().unwrap_or("echo").to_string();
      Ok(Arc::new(Echo { name }) as Arc<dyn Tool>)
    }
  }

  #[test]
  fn test_lazy_instantiation_is_cached() {
    let registry = ToolRegistry::new();
    let built = Arc::new(AtomicUsize::new(0));
    registry
      .register("echo", counting_factory(built.clone()), serde_json::json!({"name": "Echo"}))
      .unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 0);
    let a = registry.get("echo").unwrap();
    let b = registry.get("echo").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(registry.capabilities("echo").unwrap().name, "Echo");
  }

  #[test]
  fn test_duplicate_registration_rejected() {
    let registry = ToolRegistry::new();
    let built = Arc::new(AtomicUsize::new(0));
    registry
      .register("echo", counting_factory(built.clone()), serde_json::Value::Null)
      .unwrap();

    let err = registry
      .register("echo", counting_factory(built.clone()), serde_json::Value::Null)
      .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyRegistered { tool_id } if tool_id == "echo"));
  }

  #[test]
  fn test_replace_drops_cached_instance() {
    let registry = ToolRegistry::new();
    let built = Arc::new(AtomicUsize::new(0));
    registry
      .register("echo", counting_factory(built.clone()), serde_json::json!({"name": "v1"}))
      .unwrap();
    assert_eq!(registry.capabilities("echo").unwrap().name, "v1");

    registry
      .register_with(
        "echo",
        counting_factory(built.clone()),
        serde_json::json!({"name": "v2"}),
        true,
      )
      .unwrap();
    assert_eq!(registry.capabilities("echo").unwrap().name, "v2");
    assert_eq!(built.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_factory_error_propagates() {
    let registry = ToolRegistry::new();
    registry
      .register(
        "broken",
        |_| {
          Err(RegistryError::Factory {
            tool_id: "broken".to_string(),
            message: "missing api key".to_string(),
          })
        },
        serde_json::Value::Null,
      )
      .unwrap();

    assert!(matches!(registry.get("broken"), Err(RegistryError::Factory { .. })));
  }

  #[test]
  fn test_list_contains_unregister() {
    let registry = ToolRegistry::new();
    registry
      .register_instance("b", Arc::new(Echo { name: "b".into() }))
      .unwrap();
    registry
      .register_instance("a", Arc::new(Echo { name: "a".into() }))
      .unwrap();

    assert_eq!(registry.list(), vec!["a", "b"]);
    assert!(registry.contains("a"));
    registry.unregister("a").unwrap();
    assert!(!registry.contains("a"));
    assert!(matches!(
      registry.unregister("a"),
      Err(RegistryError::NotRegistered { .. })
    ));
    assert!(matches!(registry.get("a"), Err(RegistryError::NotRegistered { .. })));
  }

  #[tokio::test]
  async fn test_resolved_tool_runs() {
    let registry = ToolRegistry::new();
    registry
      .register_instance("echo", Arc::new(Echo { name: "echo".into() }))
      .unwrap();

    let tool = registry.get("echo").unwrap();
    let out = tool
      .run(&ToolInput::default(), Duration::from_secs(1))
      .await
      .unwrap();
    assert!(out.success);
    assert_eq!(out.tool_id, "echo");
  }
}

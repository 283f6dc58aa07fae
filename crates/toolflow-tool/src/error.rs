#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  #[error("tool '{tool_id}' is already registered")]
  AlreadyRegistered { tool_id: String },

  #[error("tool '{tool_id}' is not registered")]
  NotRegistered { tool_id: String },

  #[error("failed to instantiate tool '{tool_id}': {message}")]
  Factory { tool_id: String, message: String },
}

/// Input rejected by a tool's `validate`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ToolValidationError {
  pub field: String,
  pub message: String,
}

impl ToolValidationError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      message: message.into(),
    }
  }
}

/// Infrastructure failure while running a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
  #[error("tool failed: {message}")]
  Failed { message: String },

  #[error("upstream unavailable: {message}")]
  Unavailable { message: String },
}

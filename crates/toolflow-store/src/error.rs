use toolflow_config::ConfigError;

/// Error type for flow storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("flow not found: {flow_id}")]
  NotFound { flow_id: String },

  #[error("template not found: {name}")]
  TemplateNotFound { name: String },

  #[error("flow already exists: {flow_id}")]
  AlreadyExists { flow_id: String },

  #[error("flow '{flow_id}' is invalid: {}", errors.join("; "))]
  Invalid { flow_id: String, errors: Vec<String> },

  #[error("'{id}' cannot be used as a storage key")]
  InvalidId { id: String },

  #[error("unsupported file format: {path}")]
  UnsupportedFormat { path: String },

  #[error("serialization error: {message}")]
  Serialization { message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<ConfigError> for StoreError {
  fn from(err: ConfigError) -> Self {
    match err {
      ConfigError::UnsupportedFormat { path } => StoreError::UnsupportedFormat { path },
      other => StoreError::Serialization {
        message: other.to_string(),
      },
    }
  }
}

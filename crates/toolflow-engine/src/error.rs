use thiserror::Error;
use toolflow_flow::FlowError;

/// Errors that stop an execution as a whole.
///
/// Step-level timeouts and failures never surface here; they are recorded in
/// the execution result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
  #[error("validation failed: {}", errors.join("; "))]
  Validation { errors: Vec<String> },

  #[error("circular dependency: {}", cycle.join(" -> "))]
  CircularDependency { cycle: Vec<String> },

  #[error("configuration error: {message}")]
  Config { message: String },

  #[error("execution cancelled")]
  Cancelled,
}

impl From<FlowError> for ExecutionError {
  fn from(err: FlowError) -> Self {
    match err {
      FlowError::CircularDependency { cycle } => ExecutionError::CircularDependency { cycle },
      FlowError::UnknownTool { .. } => ExecutionError::Config {
        message: err.to_string(),
      },
      FlowError::Invalid { errors } => ExecutionError::Validation {
        errors: errors.iter().map(ToString::to_string).collect(),
      },
      other => ExecutionError::Validation {
        errors: vec![other.to_string()],
      },
    }
  }
}

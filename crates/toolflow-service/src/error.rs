use toolflow_engine::ExecutionError;
use toolflow_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  #[error(transparent)]
  Engine(#[from] ExecutionError),

  #[error(transparent)]
  Store(#[from] StoreError),

  /// Another request for the same fingerprint ran the flow and it failed.
  #[error("shared execution failed: {message}")]
  Coalesced { message: String },
}

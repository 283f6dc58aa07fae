use crate::format::ConfigFormat;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("unsupported config format for '{path}' (expected .json, .yaml or .yml)")]
  UnsupportedFormat { path: String },

  #[error("failed to parse {format}: {message}")]
  Parse { format: ConfigFormat, message: String },

  #[error("failed to render {format}: {message}")]
  Render { format: ConfigFormat, message: String },
}

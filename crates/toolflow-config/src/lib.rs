//! Serializable flow configuration for toolflow.
//!
//! These are the types users author (by hand or through the config manager)
//! and that the validator and engine consume.

mod document;
mod enums;
mod error;
mod flow;
mod format;
mod history;
mod step;
mod template;

pub use document::{FlowDocument, FlowMetadata};
pub use enums::{AggregationStrategy, ExecutionStrategy, RetryBackoff};
pub use error::ConfigError;
pub use flow::FlowDefinition;
pub use format::ConfigFormat;
pub use history::{ChangeRecord, ChangeType};
pub use step::ToolStep;
pub use template::FlowTemplate;

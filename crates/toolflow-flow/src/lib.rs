//! Dependency analysis and validation for toolflow flows.

mod error;
mod graph;
mod plan;
mod validator;

pub use error::FlowError;
pub use graph::Graph;
pub use plan::{ExecutionPlan, StepGroup};
pub use validator::{FlowValidator, ValidationReport};

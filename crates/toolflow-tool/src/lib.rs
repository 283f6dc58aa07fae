//! Plugin contract for toolflow analysis tools.

mod error;
mod registry;
mod tool;

pub use error::{RegistryError, ToolError, ToolValidationError};
pub use registry::{ToolFactory, ToolRegistry};
pub use tool::{Tool, ToolCapabilities, ToolInput, ToolOutput};

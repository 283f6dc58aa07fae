use thiserror::Error;

/// Problems found while validating a flow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
  #[error("flow '{flow_id}' has no steps")]
  EmptyFlow { flow_id: String },

  #[error("duplicate step id: {tool_id}")]
  DuplicateStep { tool_id: String },

  #[error("tool '{tool_id}' is not registered")]
  UnknownTool { tool_id: String },

  #[error("step '{tool_id}' has a zero timeout")]
  InvalidTimeout { tool_id: String },

  #[error("step '{tool_id}' must allow at least one attempt")]
  InvalidRetryCount { tool_id: String },

  #[error("step '{tool_id}' depends on unknown step '{dependency}'")]
  UnknownDependency { tool_id: String, dependency: String },

  #[error("step '{tool_id}' depends on itself")]
  SelfDependency { tool_id: String },

  #[error("circular dependency: {}", cycle.join(" -> "))]
  CircularDependency { cycle: Vec<String> },

  #[error("step '{to}' depends on '{from}' but both are in parallel group '{group}'")]
  SameGroupDependency {
    group: String,
    from: String,
    to: String,
  },

  #[error("circular dependency between parallel groups: {}", cycle.join(" -> "))]
  GroupCycle { cycle: Vec<String> },

  #[error("invalid flow: {}", join(errors))]
  Invalid { errors: Vec<FlowError> },
}

fn join(errors: &[FlowError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

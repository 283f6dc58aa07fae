//! Flow execution for toolflow.
//!
//! The `FlowEngine` schedules a validated flow's steps (sequentially, by
//! parallel group, or in waves of groups), enforces timeouts and retries,
//! tracks each execution, and aggregates the tool outputs into a single
//! `FlowExecutionResult`.

mod engine;
mod error;
mod events;
mod result;
mod step;
mod tracker;

pub use engine::{EngineConfig, FlowEngine};
pub use error::ExecutionError;
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use result::{FailureKind, FlowExecutionResult, StepFailure};
pub use tracker::{ExecutionStatus, ExecutionTracker, StepStatus, TrackedExecution, TrackerError};

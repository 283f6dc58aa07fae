//! Execution events and notifiers.
//!
//! The engine reports progress through an `ExecutionNotifier` so callers can
//! stream, persist or ignore it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a flow executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  ExecutionStarted {
    execution_id: String,
    flow_id: String,
  },

  StepStarted {
    execution_id: String,
    tool_id: String,
  },

  /// A step finished, successfully or not, after `attempts` tries.
  StepEnded {
    execution_id: String,
    tool_id: String,
    success: bool,
    attempts: u32,
    duration_ms: u64,
    error: Option<String>,
  },

  /// A step was never started.
  StepSkipped {
    execution_id: String,
    tool_id: String,
  },

  ExecutionEnded {
    execution_id: String,
    success: bool,
    duration_ms: u64,
  },
}

impl ExecutionEvent {
  pub fn execution_id(&self) -> &str {
    match self {
      ExecutionEvent::ExecutionStarted { execution_id, .. }
      | ExecutionEvent::StepStarted { execution_id, .. }
      | ExecutionEvent::StepEnded { execution_id, .. }
      | ExecutionEvent::StepSkipped { execution_id, .. }
      | ExecutionEvent::ExecutionEnded { execution_id, .. } => execution_id,
    }
  }
}

/// Receives execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a running flow; volume is a
  // handful of events per step.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

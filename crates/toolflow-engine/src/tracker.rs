//! In-memory execution tracking.
//!
//! Each engine owns one tracker. Finished executions are retained up to a
//! fixed count, oldest evicted first.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl ExecutionStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
  }

  fn can_transition_to(&self, next: ExecutionStatus) -> bool {
    matches!(
      (self, next),
      (ExecutionStatus::Pending, ExecutionStatus::Running)
        | (ExecutionStatus::Pending, ExecutionStatus::Failed)
        | (ExecutionStatus::Running, ExecutionStatus::Completed)
        | (ExecutionStatus::Running, ExecutionStatus::Failed)
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
  Completed,
  Failed,
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedExecution {
  pub execution_id: String,
  pub flow_id: String,
  pub status: ExecutionStatus,
  pub completed_tools: Vec<String>,
  pub failed_tools: Vec<String>,
  pub skipped_tools: Vec<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
  #[error("execution '{execution_id}' is not tracked")]
  NotFound { execution_id: String },

  #[error("execution '{execution_id}' cannot move from {from:?} to {to:?}")]
  InvalidTransition {
    execution_id: String,
    from: ExecutionStatus,
    to: ExecutionStatus,
  },
}

#[derive(Default)]
struct TrackerState {
  executions: HashMap<String, TrackedExecution>,
  finished: VecDeque<String>,
}

pub struct ExecutionTracker {
  state: Mutex<TrackerState>,
  retention: usize,
}

impl ExecutionTracker {
  /// `retention` bounds how many finished executions stay queryable.
  pub fn new(retention: usize) -> Self {
    Self {
      state: Mutex::new(TrackerState::default()),
      retention,
    }
  }

  /// Start tracking an execution in the `Pending` state.
  pub fn create(&self, execution_id: &str, flow_id: &str) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.executions.insert(
      execution_id.to_string(),
      TrackedExecution {
        execution_id: execution_id.to_string(),
        flow_id: flow_id.to_string(),
        status: ExecutionStatus::Pending,
        completed_tools: Vec::new(),
        failed_tools: Vec::new(),
        skipped_tools: Vec::new(),
        started_at: Utc::now(),
        finished_at: None,
      },
    );
  }

  pub fn transition(&self, execution_id: &str, to: ExecutionStatus) -> Result<(), TrackerError> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let execution =
      state
        .executions
        .get_mut(execution_id)
        .ok_or_else(|| TrackerError::NotFound {
          execution_id: execution_id.to_string(),
        })?;

    if !execution.status.can_transition_to(to) {
      return Err(TrackerError::InvalidTransition {
        execution_id: execution_id.to_string(),
        from: execution.status,
        to,
      });
    }
    execution.status = to;

    if to.is_terminal() {
      execution.finished_at = Some(Utc::now());
      state.finished.push_back(execution_id.to_string());
      while state.finished.len() > self.retention {
        if let Some(evicted) = state.finished.pop_front() {
          state.executions.remove(&evicted);
        }
      }
    }
    Ok(())
  }

  pub fn record_step(
    &self,
    execution_id: &str,
    tool_id: &str,
    status: StepStatus,
  ) -> Result<(), TrackerError> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let execution =
      state
        .executions
        .get_mut(execution_id)
        .ok_or_else(|| TrackerError::NotFound {
          execution_id: execution_id.to_string(),
        })?;

    let list = match status {
      StepStatus::Completed => &mut execution.completed_tools,
      StepStatus::Failed => &mut execution.failed_tools,
      StepStatus::Skipped => &mut execution.skipped_tools,
    };
    list.push(tool_id.to_string());
    Ok(())
  }

  pub fn get(&self, execution_id: &str) -> Option<TrackedExecution> {
    let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.executions.get(execution_id).cloned()
  }

  /// Executions that have not reached a terminal state.
  pub fn active(&self) -> Vec<TrackedExecution> {
    let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let mut active: Vec<TrackedExecution> = state
      .executions
      .values()
      .filter(|e| !e.status.is_terminal())
      .cloned()
      .collect();
    active.sort_by_key(|e| e.started_at);
    active
  }

  pub fn len(&self) -> usize {
    let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.executions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_machine() {
    let tracker = ExecutionTracker::new(10);
    tracker.create("e1", "flow");
    assert_eq!(tracker.get("e1").unwrap().status, ExecutionStatus::Pending);

    tracker.transition("e1", ExecutionStatus::Running).unwrap();
    tracker.record_step("e1", "a", StepStatus::Completed).unwrap();
    tracker.record_step("e1", "b", StepStatus::Skipped).unwrap();
    tracker.transition("e1", ExecutionStatus::Completed).unwrap();

    let tracked = tracker.get("e1").unwrap();
    assert_eq!(tracked.completed_tools, vec!["a"]);
    assert_eq!(tracked.skipped_tools, vec!["b"]);
    assert!(tracked.finished_at.is_some());

    let err = tracker.transition("e1", ExecutionStatus::Running).unwrap_err();
    assert_eq!(
      err,
      TrackerError::InvalidTransition {
        execution_id: "e1".into(),
        from: ExecutionStatus::Completed,
        to: ExecutionStatus::Running,
      }
    );
  }

  #[test]
  fn test_pending_cannot_complete() {
    let tracker = ExecutionTracker::new(10);
    tracker.create("e1", "flow");
    assert!(tracker.transition("e1", ExecutionStatus::Completed).is_err());
    assert!(tracker.transition("e1", ExecutionStatus::Failed).is_ok());
  }

  #[test]
  fn test_retention_evicts_oldest_finished() {
    let tracker = ExecutionTracker::new(2);
    for id in ["e1", "e2", "e3"] {
      tracker.create(id, "flow");
      tracker.transition(id, ExecutionStatus::Running).unwrap();
      tracker.transition(id, ExecutionStatus::Completed).unwrap();
    }
    tracker.create("e4", "flow");

    assert!(tracker.get("e1").is_none());
    assert!(tracker.get("e2").is_some());
    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.active().len(), 1);
  }

  #[test]
  fn test_unknown_execution() {
    let tracker = ExecutionTracker::new(2);
    assert!(matches!(
      tracker.record_step("nope", "a", StepStatus::Failed),
      Err(TrackerError::NotFound { .. })
    ));
  }
}

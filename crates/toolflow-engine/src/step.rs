//! Runs one step: spawn the tool call, enforce its timeout, retry on failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolflow_config::RetryBackoff;
use toolflow_tool::{Tool, ToolInput, ToolOutput};
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::result::{FailureKind, StepFailure};

/// How a step is to be run.
#[derive(Clone)]
pub(crate) struct StepSpec {
  pub tool_id: String,
  pub tool: Arc<dyn Tool>,
  pub timeout: Duration,
  pub attempts: u32,
  pub backoff: Option<(RetryBackoff, u64)>,
  pub deadline: Option<Instant>,
}

/// What a step produced after all attempts.
#[derive(Debug, Clone)]
pub(crate) struct StepOutcome {
  pub output: ToolOutput,
  pub failure: Option<StepFailure>,
  pub attempts: u32,
}

impl StepOutcome {
  pub fn succeeded(&self) -> bool {
    self.failure.is_none()
  }
}

/// Run a step to completion. Only cancellation is returned as an error.
pub(crate) async fn run_step(
  spec: StepSpec,
  input: Arc<ToolInput>,
  cancel: CancellationToken,
) -> Result<StepOutcome, ExecutionError> {
  let started = Instant::now();
  let mut last: Option<(ToolOutput, StepFailure)> = None;
  let mut attempts = 0;

  for attempt in 1..=spec.attempts.max(1) {
    if attempt > 1 {
      if let Some((backoff, initial_ms)) = spec.backoff {
        let delay = Duration::from_millis(backoff.delay_ms(initial_ms, attempt - 1));
        let delay = clamp_to_deadline(delay, spec.deadline);
        tokio::select! {
          _ = tokio::time::sleep(delay) => {}
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
        }
      }
    }

    let budget = clamp_to_deadline(spec.timeout, spec.deadline);
    if budget.is_zero() {
      // Total deadline already spent; stop retrying
      if last.is_none() {
        last = Some(timed_out(&spec.tool_id, attempts, "total timeout exceeded"));
      }
      break;
    }

    attempts = attempt;
    let tool = spec.tool.clone();
    let call_input = input.clone();
    let mut handle = tokio::spawn(async move { tool.run(&call_input, budget).await });

    let attempt_result = tokio::select! {
      r = tokio::time::timeout(budget, &mut handle) => r,
      _ = cancel.cancelled() => {
        handle.abort();
        return Err(ExecutionError::Cancelled);
      }
    };

    let failed = match attempt_result {
      Ok(Ok(Ok(mut output))) => {
        output.tool_id = spec.tool_id.clone();
        if output.success {
          let duration_ms = elapsed_ms(started);
          return Ok(StepOutcome {
            output: output.with_duration_ms(duration_ms),
            failure: None,
            attempts,
          });
        }
        let message = output
          .error
          .clone()
          .unwrap_or_else(|| "tool reported failure".to_string());
        let failure = failure(&spec.tool_id, FailureKind::Tool, message, attempts);
        (output, failure)
      }
      Ok(Ok(Err(e))) => failed_output(&spec.tool_id, FailureKind::Execution, e.to_string(), attempts),
      Ok(Err(join_err)) => failed_output(
        &spec.tool_id,
        FailureKind::Execution,
        format!("tool task failed: {join_err}"),
        attempts,
      ),
      Err(_) => {
        // Best effort: the tool may ignore the abort until its next await
        handle.abort();
        timed_out(
          &spec.tool_id,
          attempts,
          &format!("timed out after {}ms", budget.as_millis()),
        )
      }
    };

    debug!(
      tool_id = %spec.tool_id,
      attempt,
      kind = ?failed.1.kind,
      error = %failed.1.message,
      "step_attempt_failed"
    );
    last = Some(failed);
  }

  let duration_ms = elapsed_ms(started);
  let (output, mut failure) = last.unwrap_or_else(|| timed_out(&spec.tool_id, attempts, "total timeout exceeded"));
  failure.attempts = attempts;
  warn!(
    tool_id = %spec.tool_id,
    attempts,
    kind = ?failure.kind,
    error = %failure.message,
    "step_failed"
  );

  Ok(StepOutcome {
    output: output.with_duration_ms(duration_ms),
    failure: Some(failure),
    attempts,
  })
}

fn clamp_to_deadline(budget: Duration, deadline: Option<Instant>) -> Duration {
  match deadline {
    Some(deadline) => budget.min(deadline.saturating_duration_since(Instant::now())),
    None => budget,
  }
}

fn elapsed_ms(started: Instant) -> u64 {
  started.elapsed().as_millis() as u64
}

fn failure(tool_id: &str, kind: FailureKind, message: String, attempts: u32) -> StepFailure {
  StepFailure {
    tool_id: tool_id.to_string(),
    kind,
    message,
    attempts,
  }
}

fn failed_output(
  tool_id: &str,
  kind: FailureKind,
  message: String,
  attempts: u32,
) -> (ToolOutput, StepFailure) {
  (
    ToolOutput::failure(tool_id, message.clone()),
    failure(tool_id, kind, message, attempts),
  )
}

fn timed_out(tool_id: &str, attempts: u32, message: &str) -> (ToolOutput, StepFailure) {
  failed_output(tool_id, FailureKind::Timeout, message.to_string(), attempts)
}

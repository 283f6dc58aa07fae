//! Flow execution engine.
//!
//! `FlowEngine` validates a flow, resolves its tools and runs the steps under
//! the flow's strategy. Step failures are collected into the result; only
//! validation problems and cancellation abort an execution.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolflow_aggregator::{Aggregator, AggregatorConfig};
use toolflow_config::{ExecutionStrategy, FlowDefinition, RetryBackoff, ToolStep};
use toolflow_flow::{ExecutionPlan, FlowValidator};
use toolflow_tool::{Tool, ToolCapabilities, ToolInput, ToolOutput, ToolRegistry};
use tracing::{error, info, instrument, warn};

use crate::error::ExecutionError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::result::{FailureKind, FlowExecutionResult, StepFailure};
use crate::step::{StepOutcome, StepSpec, run_step};
use crate::tracker::{ExecutionStatus, ExecutionTracker, StepStatus, TrackerError};

const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Used when neither the step nor the tool declares a timeout.
  pub default_step_timeout_ms: u64,
  /// Finished executions kept in the tracker.
  pub tracker_retention: usize,
  pub aggregator: AggregatorConfig,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_step_timeout_ms: 30_000,
      tracker_retention: 100,
      aggregator: AggregatorConfig::default(),
    }
  }
}

struct ResolvedTool {
  tool: Arc<dyn Tool>,
  capabilities: ToolCapabilities,
}

#[derive(Default)]
struct RunState {
  tool_results: BTreeMap<String, ToolOutput>,
  successful: Vec<String>,
  failed: Vec<String>,
  skipped: Vec<String>,
  failures: Vec<StepFailure>,
  errors: Vec<String>,
  halted: bool,
  required_failed: bool,
  deadline_exceeded: bool,
}

/// Per-execution context.
struct Run<'a> {
  execution_id: String,
  flow: &'a FlowDefinition,
  tools: &'a HashMap<String, ResolvedTool>,
  input: Arc<ToolInput>,
  deadline: Option<Instant>,
  cancel: CancellationToken,
  state: RunState,
}

/// Marks a tracked execution `Failed` if `execute` is dropped before it
/// reaches a terminal state.
struct RunGuard<'a> {
  tracker: &'a ExecutionTracker,
  execution_id: String,
  armed: bool,
}

impl RunGuard<'_> {
  fn disarm(&mut self) {
    self.armed = false;
  }
}

impl Drop for RunGuard<'_> {
  fn drop(&mut self) {
    if self.armed && self.tracker.transition(&self.execution_id, ExecutionStatus::Failed).is_ok() {
      warn!(execution_id = %self.execution_id, "execution_abandoned");
    }
  }
}

/// The flow execution engine.
///
/// Generic over `N: ExecutionNotifier`. `FlowEngine::new` discards events;
/// `FlowEngine::with_notifier` delivers them to the given notifier.
pub struct FlowEngine<N: ExecutionNotifier = NoopNotifier> {
  registry: Arc<ToolRegistry>,
  validator: FlowValidator,
  aggregator: Aggregator,
  tracker: Arc<ExecutionTracker>,
  config: EngineConfig,
  notifier: N,
}

impl FlowEngine<NoopNotifier> {
  pub fn new(registry: Arc<ToolRegistry>, config: EngineConfig) -> Result<Self, ExecutionError> {
    Self::with_notifier(registry, config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> FlowEngine<N> {
  /// Create an engine that reports events to `notifier`.
  ///
  /// Fails if the aggregator weights are invalid.
  pub fn with_notifier(
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    notifier: N,
  ) -> Result<Self, ExecutionError> {
    let aggregator =
      Aggregator::new(config.aggregator.clone()).map_err(|e| ExecutionError::Config {
        message: e.to_string(),
      })?;

    Ok(Self {
      validator: FlowValidator::new(registry.clone()),
      registry,
      aggregator,
      tracker: Arc::new(ExecutionTracker::new(config.tracker_retention)),
      config,
      notifier,
    })
  }

  pub fn registry(&self) -> &Arc<ToolRegistry> {
    &self.registry
  }

  pub fn validator(&self) -> &FlowValidator {
    &self.validator
  }

  pub fn tracker(&self) -> &Arc<ExecutionTracker> {
    &self.tracker
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Execute a flow against one input.
  #[instrument(
    name = "flow_execute",
    skip(self, flow, input, cancel),
    fields(flow_id = %flow.flow_id, strategy = ?flow.execution_strategy)
  )]
  pub async fn execute(
    &self,
    flow: &FlowDefinition,
    input: ToolInput,
    cancel: CancellationToken,
  ) -> Result<FlowExecutionResult, ExecutionError> {
    let plan = self.validator.validate_for_execution(flow)?;
    let tools = self.resolve_tools(flow)?;
    self.validate_input(flow, &tools, &input)?;

    let started = Instant::now();
    let mut run = Run {
      execution_id: uuid::Uuid::new_v4().to_string(),
      flow,
      tools: &tools,
      input: Arc::new(input),
      deadline: flow
        .total_timeout_ms
        .map(|ms| started + Duration::from_millis(ms)),
      cancel,
      state: RunState::default(),
    };

    self.tracker.create(&run.execution_id, &flow.flow_id);
    self.track(self.tracker.transition(&run.execution_id, ExecutionStatus::Running));
    let mut guard = RunGuard {
      tracker: &self.tracker,
      execution_id: run.execution_id.clone(),
      armed: true,
    };
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: run.execution_id.clone(),
      flow_id: flow.flow_id.clone(),
    });
    info!(
      execution_id = %run.execution_id,
      steps = flow.steps.len(),
      groups = plan.groups.len(),
      "execution_start"
    );

    let outcome = match flow.execution_strategy {
      ExecutionStrategy::Sequential => self.run_sequential(&plan, &mut run).await,
      ExecutionStrategy::Parallel => self.run_parallel(&plan, &mut run).await,
      ExecutionStrategy::Mixed => self.run_mixed(&plan, &mut run).await,
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    guard.disarm();
    if let Err(e) = outcome {
      self.track(self.tracker.transition(&run.execution_id, ExecutionStatus::Failed));
      self.notifier.notify(ExecutionEvent::ExecutionEnded {
        execution_id: run.execution_id.clone(),
        success: false,
        duration_ms,
      });
      error!(execution_id = %run.execution_id, error = %e, "execution_aborted");
      return Err(e);
    }

    let result = self.finish(&plan, run, duration_ms);
    let status = if result.success {
      ExecutionStatus::Completed
    } else {
      ExecutionStatus::Failed
    };
    self.track(self.tracker.transition(&result.execution_id, status));
    self.notifier.notify(ExecutionEvent::ExecutionEnded {
      execution_id: result.execution_id.clone(),
      success: result.success,
      duration_ms,
    });
    info!(
      execution_id = %result.execution_id,
      success = result.success,
      succeeded = result.successful_tools.len(),
      failed = result.failed_tools.len(),
      skipped = result.skipped_tools.len(),
      duration_ms,
      "execution_end"
    );

    Ok(result)
  }

  /// One step at a time in topological order.
  async fn run_sequential(&self, plan: &ExecutionPlan, run: &mut Run<'_>) -> Result<(), ExecutionError> {
    for tool_id in &plan.order {
      self.run_batch(&[tool_id.as_str()], run).await?;
    }
    Ok(())
  }

  /// Groups one after another; members of a group concurrently.
  async fn run_parallel(&self, plan: &ExecutionPlan, run: &mut Run<'_>) -> Result<(), ExecutionError> {
    for group in &plan.groups {
      let members: Vec<&str> = group.members.iter().map(String::as_str).collect();
      self.run_batch(&members, run).await?;
    }
    Ok(())
  }

  /// Waves one after another; every group in a wave concurrently.
  async fn run_mixed(&self, plan: &ExecutionPlan, run: &mut Run<'_>) -> Result<(), ExecutionError> {
    for wave in 0..plan.waves.len() {
      let members: Vec<&str> = plan.wave_members(wave).collect();
      self.run_batch(&members, run).await?;
    }
    Ok(())
  }

  /// Launch a set of independent steps together and record their outcomes.
  async fn run_batch(&self, tool_ids: &[&str], run: &mut Run<'_>) -> Result<(), ExecutionError> {
    if run.cancel.is_cancelled() {
      return Err(ExecutionError::Cancelled);
    }

    if run.state.halted {
      for tool_id in tool_ids {
        self.skip(run, tool_id);
      }
      return Ok(());
    }

    if run.deadline.is_some_and(|d| Instant::now() >= d) {
      if !run.state.deadline_exceeded {
        run.state.deadline_exceeded = true;
        run.state.errors.push(format!(
          "total timeout of {}ms exceeded",
          run.flow.total_timeout_ms.unwrap_or_default()
        ));
        warn!(execution_id = %run.execution_id, "total_timeout_exceeded");
      }
      for tool_id in tool_ids {
        self.skip(run, tool_id);
      }
      return Ok(());
    }

    let flow = run.flow;
    let mut steps = Vec::with_capacity(tool_ids.len());
    let mut futures = Vec::with_capacity(tool_ids.len());
    for &tool_id in tool_ids {
      let Some(step) = flow.get_step(tool_id) else {
        continue;
      };
      let spec = self.step_spec(run, step)?;
      self.notifier.notify(ExecutionEvent::StepStarted {
        execution_id: run.execution_id.clone(),
        tool_id: tool_id.to_string(),
      });
      info!(
        execution_id = %run.execution_id,
        tool_id,
        timeout_ms = spec.timeout.as_millis() as u64,
        "step_start"
      );
      futures.push(run_step(spec, run.input.clone(), run.cancel.clone()));
      steps.push(step);
    }

    let outcomes = futures::future::join_all(futures).await;

    let mut cancelled = false;
    for (step, outcome) in steps.into_iter().zip(outcomes) {
      match outcome {
        Ok(outcome) => self.record(run, step, outcome),
        Err(_) => cancelled = true,
      }
    }
    if cancelled {
      return Err(ExecutionError::Cancelled);
    }
    Ok(())
  }

  fn step_spec(&self, run: &Run<'_>, step: &ToolStep) -> Result<StepSpec, ExecutionError> {
    let resolved = run
      .tools
      .get(&step.tool_id)
      .ok_or_else(|| ExecutionError::Config {
        message: format!("tool '{}' was not resolved", step.tool_id),
      })?;

    let timeout_ms = step
      .timeout_ms
      .or(Some(resolved.capabilities.default_timeout_ms).filter(|&t| t > 0))
      .unwrap_or(self.config.default_step_timeout_ms);

    let backoff = match (run.flow.retry_backoff, run.flow.retry_initial_delay_ms) {
      (Some(backoff), delay) => Some((backoff, delay.unwrap_or(DEFAULT_RETRY_DELAY_MS))),
      (None, Some(delay)) => Some((RetryBackoff::Constant, delay)),
      (None, None) => None,
    };

    Ok(StepSpec {
      tool_id: step.tool_id.clone(),
      tool: resolved.tool.clone(),
      timeout: Duration::from_millis(timeout_ms),
      attempts: step.retry_count,
      backoff,
      deadline: run.deadline,
    })
  }

  fn record(&self, run: &mut Run<'_>, step: &ToolStep, outcome: StepOutcome) {
    let tool_id = step.tool_id.clone();
    let success = outcome.succeeded();

    self.notifier.notify(ExecutionEvent::StepEnded {
      execution_id: run.execution_id.clone(),
      tool_id: tool_id.clone(),
      success,
      attempts: outcome.attempts,
      duration_ms: outcome.output.duration_ms,
      error: outcome.failure.as_ref().map(|f| f.message.clone()),
    });
    info!(
      execution_id = %run.execution_id,
      tool_id = %tool_id,
      success,
      attempts = outcome.attempts,
      duration_ms = outcome.output.duration_ms,
      "step_end"
    );

    run.state.tool_results.insert(tool_id.clone(), outcome.output);

    let Some(failure) = outcome.failure else {
      self.track(self.tracker.record_step(&run.execution_id, &tool_id, StepStatus::Completed));
      run.state.successful.push(tool_id);
      return;
    };

    self.track(self.tracker.record_step(&run.execution_id, &tool_id, StepStatus::Failed));
    if failure.kind == FailureKind::Timeout && run.deadline.is_some_and(|d| Instant::now() >= d) {
      run.state.deadline_exceeded = true;
    }
    if step.required {
      run.state.required_failed = true;
      run.state.halted = true;
    }
    if run.flow.execution_strategy == ExecutionStrategy::Sequential && !run.flow.continue_on_error {
      run.state.halted = true;
    }
    run.state.errors.push(format!("{}: {}", tool_id, failure.message));
    run.state.failures.push(failure);
    run.state.failed.push(tool_id);
  }

  fn skip(&self, run: &mut Run<'_>, tool_id: &str) {
    self.track(self.tracker.record_step(&run.execution_id, tool_id, StepStatus::Skipped));
    self.notifier.notify(ExecutionEvent::StepSkipped {
      execution_id: run.execution_id.clone(),
      tool_id: tool_id.to_string(),
    });
    run.state.skipped.push(tool_id.to_string());
  }

  fn finish(&self, plan: &ExecutionPlan, run: Run<'_>, duration_ms: u64) -> FlowExecutionResult {
    let state = run.state;

    let outputs: Vec<(&ToolOutput, &ToolCapabilities)> = plan
      .order
      .iter()
      .filter_map(|id| {
        let output = state.tool_results.get(id)?;
        let resolved = run.tools.get(id)?;
        Some((output, &resolved.capabilities))
      })
      .collect();
    let aggregation = self
      .aggregator
      .aggregate(&outputs, run.flow.aggregation_strategy);

    let success = !state.successful.is_empty()
      && (run.flow.continue_on_error || state.failed.is_empty())
      && !state.required_failed
      && !state.deadline_exceeded;

    FlowExecutionResult {
      execution_id: run.execution_id,
      flow_id: run.flow.flow_id.clone(),
      success,
      tool_results: state.tool_results,
      aggregated_scores: aggregation.scores,
      unified_insights: aggregation.insights,
      combined_recommendations: aggregation.recommendations,
      successful_tools: state.successful,
      failed_tools: state.failed,
      skipped_tools: state.skipped,
      step_failures: state.failures,
      warnings: plan.warnings.clone(),
      errors: state.errors,
      total_duration_ms: duration_ms,
    }
  }

  fn resolve_tools(
    &self,
    flow: &FlowDefinition,
  ) -> Result<HashMap<String, ResolvedTool>, ExecutionError> {
    flow
      .steps
      .iter()
      .map(|step| -> Result<(String, ResolvedTool), ExecutionError> {
        let tool = self
          .registry
          .get(&step.tool_id)
          .map_err(|e| ExecutionError::Config {
            message: e.to_string(),
          })?;
        let capabilities = tool.capabilities();
        Aggregator::check_capabilities(&capabilities).map_err(|e| ExecutionError::Config {
          message: format!("{}: {}", step.tool_id, e),
        })?;
        Ok((step.tool_id.clone(), ResolvedTool { tool, capabilities }))
      })
      .collect()
  }

  /// Every tool checks the input before anything runs.
  fn validate_input(
    &self,
    flow: &FlowDefinition,
    tools: &HashMap<String, ResolvedTool>,
    input: &ToolInput,
  ) -> Result<(), ExecutionError> {
    let errors: Vec<String> = flow
      .steps
      .iter()
      .filter_map(|step| {
        let resolved = tools.get(&step.tool_id)?;
        resolved
          .tool
          .validate(input)
          .err()
          .map(|e| format!("{}: {}", step.tool_id, e))
      })
      .collect();

    if errors.is_empty() {
      Ok(())
    } else {
      Err(ExecutionError::Validation { errors })
    }
  }

  fn track(&self, result: Result<(), TrackerError>) {
    if let Err(e) = result {
      warn!(error = %e, "tracker_update_rejected");
    }
  }
}

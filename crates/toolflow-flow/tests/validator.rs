use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use toolflow_config::{ExecutionStrategy, FlowDefinition, ToolStep};
use toolflow_flow::{FlowError, FlowValidator};
use toolflow_tool::{Tool, ToolCapabilities, ToolError, ToolInput, ToolOutput, ToolRegistry};

struct Stub {
  timeout_ms: u64,
}

#[async_trait]
impl Tool for Stub {
  fn capabilities(&self) -> ToolCapabilities {
    ToolCapabilities::new("stub", self.timeout_ms)
  }

  async fn run(&self, _input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
    Ok(ToolOutput::success("stub"))
  }
}

fn validator(ids: &[&str]) -> FlowValidator {
  let registry = ToolRegistry::new();
  for id in ids {
    registry
      .register_instance(*id, Arc::new(Stub { timeout_ms: 5_000 }))
      .unwrap();
  }
  FlowValidator::new(Arc::new(registry))
}

#[test]
fn test_valid_sequential_flow() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Sequential)
    .with_step(ToolStep::new("summary").depends_on("sentiment"))
    .with_step(ToolStep::new("sentiment"));

  let v = validator(&["sentiment", "summary"]);
  let report = v.validate(&flow);
  assert!(report.valid, "{:?}", report.errors);
  assert!(report.warnings.is_empty());

  let plan = v.validate_for_execution(&flow).unwrap();
  assert_eq!(plan.order, vec!["sentiment", "summary"]);
}

#[test]
fn test_cycle_is_reported_with_path() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Sequential)
    .with_step(ToolStep::new("a").depends_on("c"))
    .with_step(ToolStep::new("b").depends_on("a"))
    .with_step(ToolStep::new("c").depends_on("b"));

  let v = validator(&["a", "b", "c"]);
  let report = v.validate(&flow);
  assert!(!report.valid);
  assert!(matches!(
    &report.errors[..],
    [FlowError::CircularDependency { cycle }] if cycle.first() == cycle.last() && cycle.len() == 4
  ));

  assert!(matches!(
    v.validate_for_execution(&flow),
    Err(FlowError::CircularDependency { .. })
  ));
}

#[test]
fn test_collects_step_errors() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Sequential)
    .with_step(ToolStep::new("a").with_timeout_ms(0))
    .with_step(ToolStep::new("a"))
    .with_step(ToolStep::new("b").with_retries(0).depends_on("b"))
    .with_step(ToolStep::new("c").depends_on("ghost"))
    .with_step(ToolStep::new("unregistered"));

  let report = validator(&["a", "b", "c"]).validate(&flow);
  assert!(!report.valid);

  let has = |pred: &dyn Fn(&FlowError) -> bool| report.errors.iter().any(pred);
  assert!(has(&|e| matches!(e, FlowError::InvalidTimeout { tool_id } if tool_id == "a")));
  assert!(has(&|e| matches!(e, FlowError::DuplicateStep { tool_id } if tool_id == "a")));
  assert!(has(&|e| matches!(e, FlowError::InvalidRetryCount { tool_id } if tool_id == "b")));
  assert!(has(&|e| matches!(e, FlowError::SelfDependency { tool_id } if tool_id == "b")));
  assert!(has(&|e| matches!(e, FlowError::UnknownDependency { dependency, .. } if dependency == "ghost")));
  assert!(has(&|e| matches!(e, FlowError::UnknownTool { tool_id } if tool_id == "unregistered")));
}

#[test]
fn test_unknown_tool_maps_to_typed_error() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Sequential).with_step(ToolStep::new("x"));
  assert!(matches!(
    validator(&[]).validate_for_execution(&flow),
    Err(FlowError::UnknownTool { tool_id }) if tool_id == "x"
  ));
}

#[test]
fn test_empty_flow() {
  let flow = FlowDefinition::new("empty", ExecutionStrategy::Parallel);
  let err = validator(&[]).validate_for_execution(&flow).unwrap_err();
  match err {
    FlowError::Invalid { errors } => {
      assert_eq!(errors, vec![FlowError::EmptyFlow { flow_id: "empty".to_string() }])
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn test_same_group_dependency_rejected_for_parallel() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Parallel)
    .with_step(ToolStep::new("a").in_group("g"))
    .with_step(ToolStep::new("b").in_group("g").depends_on("a"));

  let v = validator(&["a", "b"]);
  let report = v.validate(&flow);
  assert_eq!(
    report.errors,
    vec![FlowError::SameGroupDependency {
      group: "g".to_string(),
      from: "a".to_string(),
      to: "b".to_string(),
    }]
  );

  // The same steps are fine when run one at a time
  let sequential = FlowDefinition {
    execution_strategy: ExecutionStrategy::Sequential,
    ..flow
  };
  assert!(v.validate(&sequential).valid);
}

#[test]
fn test_group_cycle_rejected() {
  // a(g1) -> b(g2) -> c(g1): groups g1 and g2 depend on each other
  let flow = FlowDefinition::new("f", ExecutionStrategy::Mixed)
    .with_step(ToolStep::new("a").in_group("g1"))
    .with_step(ToolStep::new("b").in_group("g2").depends_on("a"))
    .with_step(ToolStep::new("c").in_group("g1").depends_on("b"));

  let report = validator(&["a", "b", "c"]).validate(&flow);
  assert!(matches!(&report.errors[..], [FlowError::GroupCycle { .. }]));
}

#[test]
fn test_groups_and_waves() {
  let flow = FlowDefinition::new("f", ExecutionStrategy::Mixed)
    .with_step(ToolStep::new("sentiment").in_group("text"))
    .with_step(ToolStep::new("readability").in_group("text"))
    .with_step(ToolStep::new("cta"))
    .with_step(ToolStep::new("summary").depends_on("sentiment").depends_on("cta"));

  let plan = validator(&["sentiment", "readability", "cta", "summary"])
    .validate_for_execution(&flow)
    .unwrap();

  let labels: Vec<&str> = plan.groups.iter().map(|g| g.label()).collect();
  assert_eq!(labels, vec!["text", "cta", "summary"]);
  assert_eq!(plan.groups[0].members, vec!["sentiment", "readability"]);
  assert_eq!(plan.waves, vec![vec![0, 1], vec![2]]);
  assert_eq!(
    plan.wave_members(0).collect::<Vec<_>>(),
    vec!["sentiment", "readability", "cta"]
  );
}

#[test]
fn test_warnings() {
  let v = validator(&["a", "b", "c"]);

  let sequential = FlowDefinition::new("f", ExecutionStrategy::Sequential)
    .with_step(ToolStep::new("a"))
    .with_step(ToolStep::new("b"))
    .with_step(ToolStep::new("c"))
    .with_total_timeout_ms(1_000);
  let report = v.validate(&sequential);
  assert!(report.valid);
  assert_eq!(report.warnings.len(), 2, "{:?}", report.warnings);

  let singletons = FlowDefinition::new("f", ExecutionStrategy::Parallel)
    .with_step(ToolStep::new("a"))
    .with_step(ToolStep::new("b").depends_on("a"));
  let report = v.validate(&singletons);
  assert!(report.valid);
  assert_eq!(report.warnings.len(), 1);
}

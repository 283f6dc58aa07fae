use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use toolflow_config::{ExecutionStrategy, FlowDefinition, FlowTemplate, ToolStep};
use toolflow_engine::{EngineConfig, FlowEngine};
use toolflow_service::{AnalysisRequest, AnalysisResponse, AnalysisService, ServiceConfig, ServiceError};
use toolflow_store::{FlowConfigManager, FsFlowStore, StoreConfig, StoreError};
use toolflow_tool::{Tool, ToolCapabilities, ToolError, ToolInput, ToolOutput, ToolRegistry};

/// Scores the headline length and counts its calls.
struct Counting {
  calls: Arc<AtomicU32>,
  delay_ms: u64,
  succeed: bool,
}

#[async_trait]
impl Tool for Counting {
  fn capabilities(&self) -> ToolCapabilities {
    ToolCapabilities::new("counting", 5_000).with_metric("length", 1.0, Some("content"))
  }

  async fn run(&self, input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    if !self.succeed {
      return Ok(ToolOutput::failure("counting", "nothing to score"));
    }
    Ok(ToolOutput::success("counting").with_score("length", input.headline.len() as f64))
  }
}

struct Setup {
  service: AnalysisService<FsFlowStore>,
  calls: Arc<AtomicU32>,
  _dir: TempDir,
}

async fn setup(ttl_ms: u64, delay_ms: u64, succeed: bool) -> Setup {
  let dir = TempDir::new().unwrap();
  let calls = Arc::new(AtomicU32::new(0));

  let registry = Arc::new(ToolRegistry::new());
  registry
    .register_instance(
      "counting",
      Arc::new(Counting {
        calls: calls.clone(),
        delay_ms,
        succeed,
      }),
    )
    .unwrap();

  let flows = Arc::new(FlowConfigManager::new(
    FsFlowStore::new(dir.path()),
    registry.clone(),
    StoreConfig::default(),
  ));
  let flow = FlowDefinition::new("quick", ExecutionStrategy::Sequential).with_step(ToolStep::new("counting"));
  flows.save_template(FlowTemplate::new("quick", flow)).await.unwrap();

  let engine = Arc::new(FlowEngine::new(registry, EngineConfig::default()).unwrap());
  let config = ServiceConfig {
    cache_ttl_ms: ttl_ms,
    default_template: "quick".to_string(),
    ..Default::default()
  };

  Setup {
    service: AnalysisService::new(engine, flows, config),
    calls,
    _dir: dir,
  }
}

fn request() -> AnalysisRequest {
  AnalysisRequest::new("Ten words", "body", "Buy")
}

#[tokio::test]
async fn test_cached_result_is_reused() {
  let s = setup(60_000, 0, true).await;

  let first = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();
  let second = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(s.calls.load(Ordering::SeqCst), 1);
  assert_eq!(first.aggregated_scores["length"], 9.0);

  // A different request misses
  let other = request().with_platform("email");
  s.service.get_or_execute(&other, CancellationToken::new()).await.unwrap();
  assert_eq!(s.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_result_is_recomputed() {
  let s = setup(100, 0, true).await;

  let first = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();
  tokio::time::sleep(Duration::from_millis(250)).await;
  let third = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();

  assert!(!Arc::ptr_eq(&first, &third));
  assert_ne!(first.execution_id, third.execution_id);
  assert_eq!(s.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_execution() {
  let s = setup(60_000, 100, true).await;

  let req = request();
  let (a, b, c) = tokio::join!(
    s.service.get_or_execute(&req, CancellationToken::new()),
    s.service.get_or_execute(&req, CancellationToken::new()),
    s.service.get_or_execute(&req, CancellationToken::new()),
  );

  let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
  assert!(Arc::ptr_eq(&a, &b));
  assert!(Arc::ptr_eq(&a, &c));
  assert_eq!(s.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsuccessful_results_are_not_cached() {
  let s = setup(60_000, 0, false).await;

  let first = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();
  assert!(!first.success);
  assert_eq!(first.failed_tools, vec!["counting"]);

  s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();
  assert_eq!(s.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_custom_flow_falls_back_to_default_template() {
  let s = setup(60_000, 0, true).await;

  let req = request().with_custom_flow("does-not-exist");
  let result = s.service.get_or_execute(&req, CancellationToken::new()).await.unwrap();

  assert!(result.success);
  assert_eq!(result.flow_id, "quick");
  assert!(result.warnings.iter().any(|w| w.contains("does-not-exist")));
}

#[tokio::test]
async fn test_unusable_custom_flow_id_falls_back() {
  let s = setup(60_000, 0, true).await;

  for flow_id in ["team/flow", ".hidden", ""] {
    let req = request().with_custom_flow(flow_id);
    let result = s.service.get_or_execute(&req, CancellationToken::new()).await.unwrap();
    assert_eq!(result.flow_id, "quick");
    assert_eq!(result.warnings.len(), 1, "no fallback warning for {flow_id:?}");
  }
}

#[tokio::test]
async fn test_custom_flow_is_used() {
  let s = setup(60_000, 0, true).await;
  let flow = FlowDefinition::new("mine", ExecutionStrategy::Parallel).with_step(ToolStep::new("counting"));
  s.service
    .flows()
    .save(flow, "custom", Default::default(), "ana")
    .await
    .unwrap();

  let req = request().with_custom_flow("mine");
  let result = s.service.get_or_execute(&req, CancellationToken::new()).await.unwrap();
  assert_eq!(result.flow_id, "mine");
  assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_unknown_analysis_type_is_an_error() {
  let s = setup(60_000, 0, true).await;

  let req = request().with_analysis_type("nope");
  let err = s.service.get_or_execute(&req, CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, ServiceError::Store(StoreError::TemplateNotFound { .. })));
  assert_eq!(s.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_template_usage_is_counted() {
  let s = setup(60_000, 0, true).await;

  s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();
  s.service
    .get_or_execute(&request().with_analysis_type("quick"), CancellationToken::new())
    .await
    .unwrap();

  let template = s.service.flows().load_template("quick").await.unwrap();
  assert_eq!(template.usage_count, 2);
}

#[tokio::test]
async fn test_response_rendering() {
  let s = setup(60_000, 0, true).await;
  let result = s.service.get_or_execute(&request(), CancellationToken::new()).await.unwrap();

  let response = AnalysisResponse::from_result(&result);
  assert_eq!(response.tool_scores["counting"]["length"], 9.0);
  assert_eq!(response.successful_tools, vec!["counting"]);
  assert!(response.errors.is_none());

  let json = serde_json::to_value(&response).unwrap();
  assert!(json.get("errors").is_none());
  assert_eq!(json["flow_id"], "quick");
}

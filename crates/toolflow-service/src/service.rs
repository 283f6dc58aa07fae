use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolflow_config::FlowDefinition;
use toolflow_engine::{ExecutionNotifier, FlowEngine, FlowExecutionResult, NoopNotifier};
use toolflow_store::{FlowConfigManager, FlowStore, StoreError};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResultCache;
use crate::error::ServiceError;
use crate::request::AnalysisRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub cache_ttl_ms: u64,
  pub cache_capacity: u64,
  /// Period of the background sweep started by `spawn_sweeper`.
  pub sweep_interval_ms: u64,
  /// Template run when a request names no flow, or an unknown custom flow.
  pub default_template: String,
  /// Maps `analysis_type` values to template names. Types missing here are
  /// used as template names directly.
  pub analysis_types: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      cache_ttl_ms: 3_600_000,
      cache_capacity: 1_000,
      sweep_interval_ms: 60_000,
      default_template: "comprehensive".to_string(),
      analysis_types: BTreeMap::new(),
    }
  }
}

/// A flow picked for a request, plus any warning raised while picking it.
struct ResolvedFlow {
  flow: FlowDefinition,
  warning: Option<String>,
}

/// Outcome of a cache miss that must not be stored.
enum Miss {
  /// The flow ran but did not succeed; every waiter still gets the result.
  Unsuccessful(Arc<FlowExecutionResult>),
  /// The request was rejected before any tool ran.
  Rejected(String),
}

/// Entry point for analysis requests: resolves a flow, executes it and
/// caches successful results by request fingerprint.
pub struct AnalysisService<S: FlowStore, N: ExecutionNotifier = NoopNotifier> {
  engine: Arc<FlowEngine<N>>,
  flows: Arc<FlowConfigManager<S>>,
  cache: ResultCache,
  config: ServiceConfig,
}

impl<S: FlowStore, N: ExecutionNotifier> AnalysisService<S, N> {
  pub fn new(engine: Arc<FlowEngine<N>>, flows: Arc<FlowConfigManager<S>>, config: ServiceConfig) -> Self {
    let cache = ResultCache::new(
      Duration::from_millis(config.cache_ttl_ms),
      config.cache_capacity,
    );
    Self {
      engine,
      flows,
      cache,
      config,
    }
  }

  pub fn engine(&self) -> &Arc<FlowEngine<N>> {
    &self.engine
  }

  pub fn flows(&self) -> &Arc<FlowConfigManager<S>> {
    &self.flows
  }

  pub fn cache(&self) -> &ResultCache {
    &self.cache
  }

  pub fn config(&self) -> &ServiceConfig {
    &self.config
  }

  /// Return the cached result for `request`, or run its flow.
  ///
  /// Concurrent calls with the same fingerprint share one execution. Only
  /// successful results are cached. When a shared execution is rejected the
  /// caller that ran it gets the typed error and the others get
  /// [`ServiceError::Coalesced`].
  #[instrument(name = "analysis", skip(self, request, cancel), fields(fingerprint = tracing::field::Empty))]
  pub async fn get_or_execute(
    &self,
    request: &AnalysisRequest,
    cancel: CancellationToken,
  ) -> Result<Arc<FlowExecutionResult>, ServiceError> {
    let fingerprint = request.fingerprint();
    tracing::Span::current().record("fingerprint", fingerprint.as_str());

    let mut executed = false;
    let mut rejection: Option<ServiceError> = None;

    let outcome = self
      .cache
      .try_get_with(fingerprint.clone(), async {
        executed = true;
        match self.execute(request, cancel).await {
          Ok(result) if result.success => Ok(Arc::new(result)),
          Ok(result) => Err(Miss::Unsuccessful(Arc::new(result))),
          Err(e) => {
            let message = e.to_string();
            rejection = Some(e);
            Err(Miss::Rejected(message))
          }
        }
      })
      .await;

    if executed {
      debug!(fingerprint = %fingerprint, "cache_miss");
    } else {
      debug!(fingerprint = %fingerprint, "cache_hit");
    }

    match outcome {
      Ok(result) => Ok(result),
      Err(miss) => match (&*miss, rejection) {
        (Miss::Unsuccessful(result), _) => Ok(result.clone()),
        (Miss::Rejected(_), Some(e)) => Err(e),
        (Miss::Rejected(message), None) => Err(ServiceError::Coalesced {
          message: message.clone(),
        }),
      },
    }
  }

  /// Run the flow for `request` without consulting the cache.
  pub async fn execute(
    &self,
    request: &AnalysisRequest,
    cancel: CancellationToken,
  ) -> Result<FlowExecutionResult, ServiceError> {
    let resolved = self.resolve(request).await?;
    let mut result = self
      .engine
      .execute(&resolved.flow, request.to_input(), cancel)
      .await?;
    if let Some(warning) = resolved.warning {
      result.warnings.push(warning);
    }

    info!(
      flow_id = %result.flow_id,
      success = result.success,
      duration_ms = result.total_duration_ms,
      "analysis_complete"
    );
    Ok(result)
  }

  /// Start the periodic cache sweep. Stops when `cancel` fires.
  pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
    self
      .cache
      .spawn_sweeper(Duration::from_millis(self.config.sweep_interval_ms), cancel)
  }

  async fn resolve(&self, request: &AnalysisRequest) -> Result<ResolvedFlow, ServiceError> {
    if let Some(flow_id) = &request.custom_flow_id {
      return match self.flows.load(flow_id).await {
        Ok(flow) => Ok(ResolvedFlow { flow, warning: None }),
        // Ids the store cannot hold cannot name a stored flow either
        Err(StoreError::NotFound { .. } | StoreError::InvalidId { .. }) => {
          let template = &self.config.default_template;
          warn!(flow_id = %flow_id, template = %template, "custom_flow_missing");
          let flow = self.flows.use_template(template).await?;
          Ok(ResolvedFlow {
            flow,
            warning: Some(format!(
              "custom flow '{flow_id}' not found, used template '{template}'"
            )),
          })
        }
        Err(e) => Err(e.into()),
      };
    }

    let template = match &request.analysis_type {
      Some(kind) => self.config.analysis_types.get(kind).unwrap_or(kind),
      None => &self.config.default_template,
    };
    let flow = self.flows.use_template(template).await?;
    Ok(ResolvedFlow { flow, warning: None })
  }
}

use serde::{Deserialize, Serialize};

/// How the steps of a flow are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
  /// One step at a time, in topological order.
  #[default]
  Sequential,
  /// Parallel groups one after another, members of a group concurrently.
  Parallel,
  /// Parallel groups layered into waves; every group of a wave runs concurrently.
  Mixed,
}

/// How per-metric values from several tools are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
  #[default]
  WeightedMean,
  Mean,
  Max,
  Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  Exponential,
}

impl RetryBackoff {
  /// Delay to wait before retry number `retry` (1-based).
  pub fn delay_ms(&self, initial_delay_ms: u64, retry: u32) -> u64 {
    match self {
      RetryBackoff::Constant => initial_delay_ms,
      RetryBackoff::Linear => initial_delay_ms.saturating_mul(retry as u64),
      RetryBackoff::Exponential => {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        initial_delay_ms.saturating_mul(factor)
      }
    }
  }
}

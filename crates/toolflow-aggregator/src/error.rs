#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregateError {
  #[error("category weight for '{category}' must be a non-negative number, got {weight}")]
  InvalidWeight { category: String, weight: f64 },

  #[error("tool '{tool}' declares weight {weight} for metric '{metric}'; weights must be non-negative numbers")]
  InvalidMetricWeight { tool: String, metric: String, weight: f64 },

  #[error("category weights must sum to 1.0, got {sum}")]
  WeightSum { sum: f64 },
}

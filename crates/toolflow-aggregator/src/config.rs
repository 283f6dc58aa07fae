use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Engine-level aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
  /// Blend weights for `overall_score`, keyed by category. Must sum to 1.0 when set.
  pub category_weights: BTreeMap<String, f64>,
  /// Recommendation categories listed first-to-last; unlisted categories follow.
  pub category_priority: Vec<String>,
  pub max_recommendations_per_tool: usize,
  pub max_recommendations: usize,
}

impl Default for AggregatorConfig {
  fn default() -> Self {
    Self {
      category_weights: BTreeMap::new(),
      category_priority: vec!["compliance".to_string(), "safety".to_string()],
      max_recommendations_per_tool: 3,
      max_recommendations: 10,
    }
  }
}

impl AggregatorConfig {
  pub fn validate(&self) -> Result<(), AggregateError> {
    for (category, &weight) in &self.category_weights {
      if !weight.is_finite() || weight < 0.0 {
        return Err(AggregateError::InvalidWeight {
          category: category.clone(),
          weight,
        });
      }
    }

    if !self.category_weights.is_empty() {
      let sum: f64 = self.category_weights.values().sum();
      if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(AggregateError::WeightSum { sum });
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_weights_must_sum_to_one() {
    let mut config = AggregatorConfig::default();
    assert!(config.validate().is_ok());

    config.category_weights.insert("content".into(), 0.6);
    config.category_weights.insert("compliance".into(), 0.3);
    assert!(matches!(config.validate(), Err(AggregateError::WeightSum { .. })));

    config.category_weights.insert("compliance".into(), 0.4);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_negative_weight_rejected() {
    let mut config = AggregatorConfig::default();
    config.category_weights.insert("content".into(), 1.5);
    config.category_weights.insert("compliance".into(), -0.5);
    assert!(matches!(
      config.validate(),
      Err(AggregateError::InvalidWeight { category, .. }) if category == "compliance"
    ));
  }
}

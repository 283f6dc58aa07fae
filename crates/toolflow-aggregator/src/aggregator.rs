//! Merges the outputs of every successful tool into one set of scores,
//! insights and recommendations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use toolflow_config::AggregationStrategy;
use toolflow_tool::{ToolCapabilities, ToolOutput};
use tracing::debug;

use crate::config::AggregatorConfig;
use crate::error::AggregateError;

pub const OVERALL_SCORE: &str = "overall_score";
const CATEGORY_PREFIX: &str = "overall_";

/// A recommendation tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
  pub tool_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
  /// Per-metric values plus `overall_<category>` composites and `overall_score`.
  pub scores: BTreeMap<String, f64>,
  /// tool_id -> that tool's insights.
  pub insights: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
  pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
  config: AggregatorConfig,
}

impl Aggregator {
  pub fn new(config: AggregatorConfig) -> Result<Self, AggregateError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &AggregatorConfig {
    &self.config
  }

  /// Reject metric weights that would skew the weighted mean.
  pub fn check_capabilities(capabilities: &ToolCapabilities) -> Result<(), AggregateError> {
    for (metric, &weight) in &capabilities.metric_weights {
      if !weight.is_finite() || weight < 0.0 {
        return Err(AggregateError::InvalidMetricWeight {
          tool: capabilities.name.clone(),
          metric: metric.clone(),
          weight,
        });
      }
    }
    Ok(())
  }

  /// Aggregate tool outputs. Unsuccessful outputs are ignored.
  pub fn aggregate(
    &self,
    outputs: &[(&ToolOutput, &ToolCapabilities)],
    strategy: AggregationStrategy,
  ) -> Aggregation {
    let successful: Vec<_> = outputs.iter().filter(|(o, _)| o.success).collect();

    // metric -> (value, weight) pairs; category from the first tool declaring one
    let mut samples: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    let mut categories: BTreeMap<&str, &str> = BTreeMap::new();
    for (output, caps) in &successful {
      for (metric, &value) in &output.scores {
        if !value.is_finite() {
          continue;
        }
        samples
          .entry(metric.as_str())
          .or_default()
          .push((value, caps.weight(metric)));
        if let Some(category) = caps.category(metric) {
          categories.entry(metric.as_str()).or_insert(category);
        }
      }
    }

    let mut scores: BTreeMap<String, f64> = samples
      .iter()
      .filter_map(|(metric, values)| combine(values, strategy).map(|v| (metric.to_string(), v)))
      .collect();

    let composites = self.composites(&scores, &categories);
    if let Some(overall) = self.blend(&composites) {
      scores.insert(OVERALL_SCORE.to_string(), overall);
    }
    for (category, value) in composites {
      scores.insert(format!("{CATEGORY_PREFIX}{category}"), value);
    }

    let insights = successful
      .iter()
      .map(|(o, _)| (o.tool_id.clone(), o.insights.clone()))
      .collect();

    let recommendations = self.merge_recommendations(&successful);

    debug!(
      tools = successful.len(),
      metrics = scores.len(),
      recommendations = recommendations.len(),
      "aggregation_complete"
    );

    Aggregation {
      scores,
      insights,
      recommendations,
    }
  }

  /// Mean of the aggregated metrics in each declared category.
  fn composites<'a>(
    &self,
    scores: &BTreeMap<String, f64>,
    categories: &BTreeMap<&str, &'a str>,
  ) -> BTreeMap<&'a str, f64> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (metric, category) in categories {
      if let Some(&value) = scores.get(*metric) {
        grouped.entry(*category).or_default().push(value);
      }
    }
    grouped
      .into_iter()
      .map(|(category, values)| (category, values.iter().sum::<f64>() / values.len() as f64))
      .collect()
  }

  /// Linear blend of the composites, renormalized over the categories present.
  fn blend(&self, composites: &BTreeMap<&str, f64>) -> Option<f64> {
    if composites.is_empty() {
      return None;
    }

    let weighted: Vec<(f64, f64)> = composites
      .iter()
      .filter_map(|(category, &value)| {
        self
          .config
          .category_weights
          .get(*category)
          .map(|&w| (value, w))
      })
      .collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();

    if total > 0.0 {
      Some(weighted.iter().map(|(v, w)| v * w).sum::<f64>() / total)
    } else {
      Some(composites.values().sum::<f64>() / composites.len() as f64)
    }
  }

  fn merge_recommendations(
    &self,
    successful: &[&(&ToolOutput, &ToolCapabilities)],
  ) -> Vec<Recommendation> {
    let mut merged: Vec<Recommendation> = successful
      .iter()
      .flat_map(|(output, caps)| {
        output
          .recommendations
          .iter()
          .take(self.config.max_recommendations_per_tool)
          .map(move |text| Recommendation {
            tool_id: output.tool_id.clone(),
            category: caps.recommendation_category.clone(),
            text: text.clone(),
          })
      })
      .collect();

    let unlisted = self.config.category_priority.len();
    merged.sort_by_key(|r| {
      r.category
        .as_deref()
        .and_then(|c| self.config.category_priority.iter().position(|p| p == c))
        .unwrap_or(unlisted)
    });
    merged.truncate(self.config.max_recommendations);
    merged
  }
}

fn combine(values: &[(f64, f64)], strategy: AggregationStrategy) -> Option<f64> {
  if values.is_empty() {
    return None;
  }
  let mean = || values.iter().map(|(v, _)| v).sum::<f64>() / values.len() as f64;

  let combined = match strategy {
    AggregationStrategy::WeightedMean => {
      let total_weight: f64 = values.iter().map(|(_, w)| w).sum();
      if total_weight > 0.0 {
        values.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight
      } else {
        mean()
      }
    }
    AggregationStrategy::Mean => mean(),
    AggregationStrategy::Max => values.iter().map(|(v, _)| *v).fold(f64::MIN, f64::max),
    AggregationStrategy::Min => values.iter().map(|(v, _)| *v).fold(f64::MAX, f64::min),
  };
  Some(combined)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn caps(name: &str) -> ToolCapabilities {
    ToolCapabilities::new(name, 1_000)
  }

  #[test]
  fn test_weighted_mean_exact() {
    let a = ToolOutput::success("a").with_score("x", 80.0);
    let b = ToolOutput::success("b").with_score("x", 60.0);
    let ca = caps("a").with_metric("x", 0.3, None);
    let cb = caps("b").with_metric("x", 0.7, None);

    let agg = Aggregator::new(AggregatorConfig::default()).unwrap();
    let result = agg.aggregate(&[(&a, &ca), (&b, &cb)], AggregationStrategy::WeightedMean);
    assert_eq!(result.scores["x"], 66.0);
    assert!(!result.scores.contains_key(OVERALL_SCORE));
  }

  #[test]
  fn test_metric_weights_checked() {
    assert!(Aggregator::check_capabilities(&caps("a").with_metric("x", 0.0, None)).is_ok());
    for bad in [f64::NAN, f64::INFINITY, -0.5] {
      let err = Aggregator::check_capabilities(&caps("a").with_metric("x", bad, None)).unwrap_err();
      assert!(matches!(err, AggregateError::InvalidMetricWeight { ref metric, .. } if metric == "x"));
    }
  }

  #[test]
  fn test_alternative_strategies() {
    let a = ToolOutput::success("a").with_score("x", 80.0);
    let b = ToolOutput::success("b").with_score("x", 60.0);
    let (ca, cb) = (caps("a"), caps("b"));
    let agg = Aggregator::new(AggregatorConfig::default()).unwrap();
    let outputs = [(&a, &ca), (&b, &cb)];

    assert_eq!(agg.aggregate(&outputs, AggregationStrategy::Mean).scores["x"], 70.0);
    assert_eq!(agg.aggregate(&outputs, AggregationStrategy::Max).scores["x"], 80.0);
    assert_eq!(agg.aggregate(&outputs, AggregationStrategy::Min).scores["x"], 60.0);
  }

  #[test]
  fn test_failed_outputs_ignored() {
    let a = ToolOutput::success("a").with_score("x", 50.0);
    let b = ToolOutput::failure("b", "boom").with_score("x", 0.0);
    let (ca, cb) = (caps("a"), caps("b"));

    let agg = Aggregator::new(AggregatorConfig::default()).unwrap();
    let result = agg.aggregate(&[(&a, &ca), (&b, &cb)], AggregationStrategy::WeightedMean);
    assert_eq!(result.scores["x"], 50.0);
    assert!(!result.insights.contains_key("b"));
  }

  #[test]
  fn test_category_composites_and_overall_blend() {
    let a = ToolOutput::success("a")
      .with_score("clarity", 80.0)
      .with_score("tone", 60.0);
    let b = ToolOutput::success("b").with_score("risk", 90.0);
    let ca = caps("a")
      .with_metric("clarity", 1.0, Some("content"))
      .with_metric("tone", 1.0, Some("content"));
    let cb = caps("b").with_metric("risk", 1.0, Some("compliance"));

    let mut config = AggregatorConfig::default();
    config.category_weights.insert("content".into(), 0.5);
    config.category_weights.insert("compliance".into(), 0.25);
    config.category_weights.insert("performance".into(), 0.25);
    let agg = Aggregator::new(config).unwrap();

    let result = agg.aggregate(&[(&a, &ca), (&b, &cb)], AggregationStrategy::WeightedMean);
    assert_eq!(result.scores["overall_content"], 70.0);
    assert_eq!(result.scores["overall_compliance"], 90.0);
    // performance absent: (70*0.5 + 90*0.25) / 0.75
    let expected = (70.0 * 0.5 + 90.0 * 0.25) / 0.75;
    assert!((result.scores[OVERALL_SCORE] - expected).abs() < 1e-9);
  }

  #[test]
  fn test_equal_blend_without_weights() {
    let a = ToolOutput::success("a").with_score("clarity", 80.0);
    let b = ToolOutput::success("b").with_score("risk", 40.0);
    let ca = caps("a").with_metric("clarity", 1.0, Some("content"));
    let cb = caps("b").with_metric("risk", 1.0, Some("compliance"));

    let agg = Aggregator::new(AggregatorConfig::default()).unwrap();
    let result = agg.aggregate(&[(&a, &ca), (&b, &cb)], AggregationStrategy::WeightedMean);
    assert_eq!(result.scores[OVERALL_SCORE], 60.0);
  }

  #[test]
  fn test_recommendations_truncated_and_prioritized() {
    let content = ToolOutput::success("content")
      .with_recommendation("c1")
      .with_recommendation("c2")
      .with_recommendation("c3");
    let legal = ToolOutput::success("legal")
      .with_recommendation("l1")
      .with_recommendation("l2");
    let cc = caps("content").with_recommendation_category("content");
    let cl = caps("legal").with_recommendation_category("compliance");

    let config = AggregatorConfig {
      max_recommendations_per_tool: 2,
      max_recommendations: 3,
      ..AggregatorConfig::default()
    };
    let agg = Aggregator::new(config).unwrap();
    let result = agg.aggregate(&[(&content, &cc), (&legal, &cl)], AggregationStrategy::WeightedMean);

    let texts: Vec<&str> = result.recommendations.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["l1", "l2", "c1"]);
    assert_eq!(result.recommendations[0].tool_id, "legal");
    assert_eq!(result.recommendations[0].category.as_deref(), Some("compliance"));
  }

  #[test]
  fn test_insights_keyed_by_tool() {
    let a = ToolOutput::success("a").with_insight("tone", serde_json::json!("upbeat"));
    let ca = caps("a");
    let agg = Aggregator::new(AggregatorConfig::default()).unwrap();
    let result = agg.aggregate(&[(&a, &ca)], AggregationStrategy::WeightedMean);
    assert_eq!(result.insights["a"]["tone"], "upbeat");
  }
}

//! Reference tools shipped with the binary, and the templates that use them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use toolflow_config::{ExecutionStrategy, FlowDefinition, FlowTemplate, ToolStep};
use toolflow_store::{FlowConfigManager, FlowStore, StoreError};
use toolflow_tool::{
  RegistryError, Tool, ToolCapabilities, ToolError, ToolInput, ToolOutput, ToolRegistry, ToolValidationError,
};

pub const TEXT_LENGTH: &str = "text-length";
pub const CTA_STRENGTH: &str = "cta-strength";
pub const COMPLIANCE_CHECK: &str = "compliance-check";

/// Scores headline and body length against a target range.
struct TextLength {
  ideal_headline_words: (usize, usize),
}

#[async_trait]
impl Tool for TextLength {
  fn capabilities(&self) -> ToolCapabilities {
    ToolCapabilities::new(TEXT_LENGTH, 2_000)
      .with_metric("headline_length", 1.0, Some("content"))
      .with_metric("body_length", 0.5, Some("content"))
  }

  fn validate(&self, input: &ToolInput) -> Result<(), ToolValidationError> {
    if input.headline.trim().is_empty() {
      return Err(ToolValidationError::new("headline", "must not be empty"));
    }
    Ok(())
  }

  async fn run(&self, input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
    let words = input.headline.split_whitespace().count();
    let (low, high) = self.ideal_headline_words;
    let headline_score = if words < low {
      100.0 * words as f64 / low as f64
    } else if words > high {
      (100.0 - 10.0 * (words - high) as f64).max(0.0)
    } else {
      100.0
    };

    let body_words = input.body_text.split_whitespace().count();
    let body_score = match body_words {
      0 => 0.0,
      n if n <= 150 => 100.0,
      n => (100.0 - (n - 150) as f64 / 5.0).max(20.0),
    };

    let mut output = ToolOutput::success(TEXT_LENGTH)
      .with_score("headline_length", headline_score)
      .with_score("body_length", body_score)
      .with_insight("headline_words", json!(words))
      .with_insight("body_words", json!(body_words));
    if words > high {
      output = output.with_recommendation(format!("Shorten the headline to at most {high} words"));
    }
    if words < low {
      output = output.with_recommendation(format!("Lengthen the headline to at least {low} words"));
    }
    Ok(output)
  }
}

/// Rates the call to action by its use of action verbs and urgency.
struct CtaStrength;

const ACTION_VERBS: &[&str] = &["buy", "get", "start", "join", "try", "shop", "book", "download", "sign"];
const URGENCY: &[&str] = &["now", "today", "limited", "last", "only"];

#[async_trait]
impl Tool for CtaStrength {
  fn capabilities(&self) -> ToolCapabilities {
    ToolCapabilities::new(CTA_STRENGTH, 2_000).with_metric("cta_strength", 1.0, Some("engagement"))
  }

  async fn run(&self, input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
    let cta = input.cta.to_lowercase();
    if cta.trim().is_empty() {
      return Ok(ToolOutput::failure(CTA_STRENGTH, "no call to action provided"));
    }

    let has_verb = cta.split_whitespace().any(|w| ACTION_VERBS.contains(&w));
    let has_urgency = cta.split_whitespace().any(|w| URGENCY.contains(&w));
    let score = 40.0 + if has_verb { 40.0 } else { 0.0 } + if has_urgency { 20.0 } else { 0.0 };

    let mut output = ToolOutput::success(CTA_STRENGTH)
      .with_score("cta_strength", score)
      .with_insight("action_verb", json!(has_verb))
      .with_insight("urgency", json!(has_urgency));
    if !has_verb {
      output = output.with_recommendation("Open the call to action with a verb");
    }
    if !has_urgency {
      output = output.with_recommendation("Add a sense of urgency to the call to action");
    }
    Ok(output)
  }
}

/// Flags wording that advertising rules commonly restrict.
struct ComplianceCheck {
  banned: Vec<String>,
}

#[async_trait]
impl Tool for ComplianceCheck {
  fn capabilities(&self) -> ToolCapabilities {
    ToolCapabilities::new(COMPLIANCE_CHECK, 2_000)
      .with_metric("compliance", 1.0, Some("compliance"))
      .with_recommendation_category("compliance")
  }

  async fn run(&self, input: &ToolInput, _timeout: Duration) -> Result<ToolOutput, ToolError> {
    let text = format!("{} {} {}", input.headline, input.body_text, input.cta).to_lowercase();
    let hits: Vec<&str> = self
      .banned
      .iter()
      .map(String::as_str)
      .filter(|phrase| text.contains(phrase))
      .collect();

    let score = (100.0 - 25.0 * hits.len() as f64).max(0.0);
    let mut output = ToolOutput::success(COMPLIANCE_CHECK)
      .with_score("compliance", score)
      .with_insight("flagged", json!(hits));
    for phrase in &hits {
      output = output.with_recommendation(format!("Remove or substantiate \"{phrase}\""));
    }
    Ok(output)
  }
}

const DEFAULT_BANNED: &[&str] = &["guaranteed", "risk-free", "100% free", "miracle", "no side effects"];

/// Register the reference tools. Each factory reads its settings from the
/// entry for its id in `configs`, if any.
pub fn register(registry: &ToolRegistry, configs: &BTreeMap<String, serde_json::Value>) -> Result<(), RegistryError> {
  let config_for = |id: &str| configs.get(id).cloned().unwrap_or_else(|| json!({}));

  registry.register(
    TEXT_LENGTH,
    |config: &serde_json::Value| {
      let low = config.get("min_words").and_then(|v| v.as_u64()).unwrap_or(4) as usize;
      let high = config.get("max_words").and_then(|v| v.as_u64()).unwrap_or(12) as usize;
      if low == 0 || low > high {
        return Err(RegistryError::Factory {
          tool_id: TEXT_LENGTH.to_string(),
          message: format!("invalid word range {low}..{high}"),
        });
      }
      Ok(Arc::new(TextLength {
        ideal_headline_words: (low, high),
      }) as Arc<dyn Tool>)
    },
    config_for(TEXT_LENGTH),
  )?;

  registry.register(
    CTA_STRENGTH,
    |_: &serde_json::Value| Ok(Arc::new(CtaStrength) as Arc<dyn Tool>),
    config_for(CTA_STRENGTH),
  )?;

  registry.register(
    COMPLIANCE_CHECK,
    |config: &serde_json::Value| {
      let banned = match config.get("banned").and_then(|v| v.as_array()) {
        Some(list) => list
          .iter()
          .filter_map(|v| v.as_str())
          .map(str::to_lowercase)
          .collect(),
        None => DEFAULT_BANNED.iter().map(|s| s.to_string()).collect(),
      };
      Ok(Arc::new(ComplianceCheck { banned }) as Arc<dyn Tool>)
    },
    config_for(COMPLIANCE_CHECK),
  )?;

  Ok(())
}

fn templates() -> Vec<FlowTemplate> {
  let comprehensive = FlowDefinition::new("comprehensive", ExecutionStrategy::Mixed)
    .with_step(ToolStep::new(TEXT_LENGTH).in_group("content"))
    .with_step(ToolStep::new(CTA_STRENGTH).in_group("content"))
    .with_step(ToolStep::new(COMPLIANCE_CHECK).required());

  let quick = FlowDefinition::new("quick", ExecutionStrategy::Sequential).with_step(ToolStep::new(TEXT_LENGTH));

  let compliance = FlowDefinition::new("compliance", ExecutionStrategy::Sequential)
    .with_step(ToolStep::new(COMPLIANCE_CHECK).required().with_retries(2));

  vec![
    FlowTemplate::new("comprehensive", comprehensive)
      .with_description("Every reference tool; content checks run together")
      .with_tag("default"),
    FlowTemplate::new("quick", quick).with_description("Headline and body length only"),
    FlowTemplate::new("compliance", compliance)
      .with_description("Restricted wording check")
      .with_tag("regulated"),
  ]
}

/// Save the reference templates that are not stored yet.
pub async fn seed_templates<S: FlowStore>(flows: &FlowConfigManager<S>) -> Result<(), StoreError> {
  for template in templates() {
    match flows.load_template(&template.name).await {
      Ok(_) => {}
      Err(StoreError::TemplateNotFound { .. }) => flows.save_template(template).await?,
      Err(e) => return Err(e),
    }
  }
  Ok(())
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use toolflow_tool::ToolInput;

/// Platform assumed when a request does not name one.
pub const DEFAULT_PLATFORM: &str = "general";

/// An analysis request as submitted by a caller.
///
/// `custom_flow_id` takes precedence over `analysis_type`. With neither set
/// the service runs its default template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
  pub headline: String,
  #[serde(default)]
  pub body_text: String,
  #[serde(default)]
  pub cta: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub industry: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub platform: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_audience: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub analysis_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub custom_flow_id: Option<String>,
}

impl AnalysisRequest {
  pub fn new(headline: impl Into<String>, body_text: impl Into<String>, cta: impl Into<String>) -> Self {
    Self {
      headline: headline.into(),
      body_text: body_text.into(),
      cta: cta.into(),
      ..Default::default()
    }
  }

  pub fn with_analysis_type(mut self, analysis_type: impl Into<String>) -> Self {
    self.analysis_type = Some(analysis_type.into());
    self
  }

  pub fn with_custom_flow(mut self, flow_id: impl Into<String>) -> Self {
    self.custom_flow_id = Some(flow_id.into());
    self
  }

  pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
    self.platform = Some(platform.into());
    self
  }

  pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
    self.industry = Some(industry.into());
    self
  }

  /// Cache key for this request: SHA-256 over the content digest followed by
  /// the context digest, hex encoded.
  ///
  /// Every field is length-prefixed so that moving text between adjacent
  /// fields changes the key.
  pub fn fingerprint(&self) -> String {
    let mut content = Sha256::new();
    write_field(&mut content, Some(&self.headline));
    write_field(&mut content, Some(&self.body_text));
    write_field(&mut content, Some(&self.cta));

    let mut context = Sha256::new();
    write_field(&mut context, self.industry.as_deref());
    write_field(&mut context, self.platform.as_deref());
    write_field(&mut context, self.target_audience.as_deref());
    write_field(&mut context, self.analysis_type.as_deref());
    write_field(&mut context, self.custom_flow_id.as_deref());

    let mut combined = Sha256::new();
    combined.update(content.finalize());
    combined.update(context.finalize());
    hex::encode(combined.finalize())
  }

  /// The payload handed to every tool.
  pub fn to_input(&self) -> ToolInput {
    ToolInput {
      headline: self.headline.clone(),
      body_text: self.body_text.clone(),
      cta: self.cta.clone(),
      platform: self
        .platform
        .clone()
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
      industry: self.industry.clone(),
      target_audience: self.target_audience.clone(),
      params: serde_json::Value::Null,
    }
  }
}

fn write_field(hasher: &mut Sha256, value: Option<&str>) {
  match value {
    None => hasher.update([0u8]),
    Some(v) => {
      hasher.update([1u8]);
      hasher.update((v.len() as u64).to_le_bytes());
      hasher.update(v.as_bytes());
    }
  }
}

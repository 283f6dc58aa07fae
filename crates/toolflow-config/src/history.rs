use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
  Created,
  Updated,
  Duplicated,
  Deleted,
  Imported,
}

/// One entry in a flow's change history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub timestamp: DateTime<Utc>,
  pub change_type: ChangeType,
  pub author: String,
  pub description: String,
}

impl ChangeRecord {
  pub fn now(change_type: ChangeType, author: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      timestamp: Utc::now(),
      change_type,
      author: author.into(),
      description: description.into(),
    }
  }
}

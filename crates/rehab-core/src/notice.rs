//! User-facing notices: the dismissible notifications a view shows when
//! something succeeded or a remote call failed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
  Info,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
  pub level:       NoticeLevel,
  pub title:       String,
  pub description: String,
}

impl Notice {
  pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      level:       NoticeLevel::Info,
      title:       title.into(),
      description: description.into(),
    }
  }

  pub fn error(description: impl Into<String>) -> Self {
    Self {
      level:       NoticeLevel::Error,
      title:       "Error".into(),
      description: description.into(),
    }
  }
}

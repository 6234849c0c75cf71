//! Profile: the application record that extends an auth identity with a
//! display name and a role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::{Role, RoleAssignment};

/// One row per identity. `id` always equals the owning user's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub id:         Uuid,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  #[serde(default)]
  pub role:       RoleAssignment,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Profile {
  /// The recognised role, if any.
  pub fn role(&self) -> Option<Role> { self.role.role() }

  /// "First Last", falling back to whichever half is present.
  pub fn display_name(&self) -> String {
    match (self.first_name.as_deref(), self.last_name.as_deref()) {
      (Some(f), Some(l)) => format!("{f} {l}"),
      (Some(n), None) | (None, Some(n)) => n.to_owned(),
      (None, None) => String::new(),
    }
  }
}

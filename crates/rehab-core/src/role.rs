//! Roles: the closed classification that decides which route subtree a
//! user may enter.
//!
//! The profile row stores the role as nullable free text. Reading it yields a
//! [`RoleAssignment`], which keeps "no role" and "a role we don't recognise"
//! apart from the four known values.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// One of the four known portal roles.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  Therapist,
  Staff,
  Family,
}

impl Role {
  /// The allowed-role set for this role's own route subtree.
  pub fn only(self) -> &'static [Role] {
    match self {
      Self::Admin => &[Self::Admin],
      Self::Therapist => &[Self::Therapist],
      Self::Staff => &[Self::Staff],
      Self::Family => &[Self::Family],
    }
  }
}

/// The role attribute of a profile as it was actually found in storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RoleAssignment {
  Assigned(Role),
  /// A non-empty value that is none of the known roles.
  Unrecognized(String),
  #[default]
  Missing,
}

impl RoleAssignment {
  /// The recognised role, if any. Unrecognised and missing both yield `None`.
  pub fn role(&self) -> Option<Role> {
    match self {
      Self::Assigned(r) => Some(*r),
      _ => None,
    }
  }

  /// The raw text that would be written back to the `role` column.
  pub fn as_stored(&self) -> Option<&str> {
    match self {
      Self::Assigned(r) => Some(r.as_ref()),
      Self::Unrecognized(s) => Some(s),
      Self::Missing => None,
    }
  }
}

impl From<Role> for RoleAssignment {
  fn from(role: Role) -> Self { Self::Assigned(role) }
}

impl From<Option<Role>> for RoleAssignment {
  fn from(role: Option<Role>) -> Self {
    role.map_or(Self::Missing, Self::Assigned)
  }
}

impl From<Option<String>> for RoleAssignment {
  fn from(raw: Option<String>) -> Self {
    match raw.as_deref().map(str::trim) {
      None | Some("") => Self::Missing,
      Some(s) => match Role::from_str(s) {
        Ok(role) => Self::Assigned(role),
        Err(_) => Self::Unrecognized(s.to_owned()),
      },
    }
  }
}

impl From<RoleAssignment> for Option<String> {
  fn from(assignment: RoleAssignment) -> Self {
    assignment.as_stored().map(str::to_owned)
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn known_roles_parse() {
    for role in Role::iter() {
      let parsed = RoleAssignment::from(Some(role.to_string()));
      assert_eq!(parsed, RoleAssignment::Assigned(role));
    }
  }

  #[test]
  fn unknown_and_missing_stay_distinct() {
    assert_eq!(
      RoleAssignment::from(Some("janitor".to_string())),
      RoleAssignment::Unrecognized("janitor".into())
    );
    assert_eq!(RoleAssignment::from(None::<String>), RoleAssignment::Missing);
    assert_eq!(RoleAssignment::from(Some("  ".to_string())), RoleAssignment::Missing);
    assert_eq!(RoleAssignment::Unrecognized("x".into()).role(), None);
  }

  #[test]
  fn serde_uses_nullable_text() {
    let json = serde_json::to_string(&RoleAssignment::Assigned(Role::Staff)).unwrap();
    assert_eq!(json, "\"staff\"");
    let json = serde_json::to_string(&RoleAssignment::Missing).unwrap();
    assert_eq!(json, "null");
    let back: RoleAssignment = serde_json::from_str("\"owner\"").unwrap();
    assert_eq!(back, RoleAssignment::Unrecognized("owner".into()));
  }
}

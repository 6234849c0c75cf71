//! Identity and session types shared by the auth service and its clients.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

/// An authenticated identity as known to the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id:                 Uuid,
  pub email:              String,
  pub email_confirmed_at: Option<DateTime<Utc>>,
  pub created_at:         DateTime<Utc>,
}

/// Opaque proof of authentication. Owned by the auth service; clients only
/// hold a transient copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token:  String,
  pub refresh_token: String,
  pub token_type:    String,
  pub expires_at:    DateTime<Utc>,
  pub user:          User,
}

impl Session {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }
}

/// Input to [`crate::store::AuthService::sign_up`].
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub email:      String,
  pub password:   String,
  pub first_name: String,
  pub last_name:  String,
  /// Role written to the new profile row.
  pub role:       Option<Role>,
}

/// Result of a sign-up.
///
/// A `None` session means the address must be confirmed before the user can
/// sign in; it is not a logged-in success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpOutcome {
  pub user:               User,
  pub session:            Option<Session>,
  /// Handed to whoever delivers the confirmation email; never sent back to
  /// the client.
  #[serde(skip)]
  pub confirmation_token: Option<String>,
}

/// Knobs the auth service applies to sign-ups and sessions.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
  pub session_ttl:                TimeDelta,
  pub require_email_confirmation: bool,
}

impl Default for AuthPolicy {
  fn default() -> Self {
    Self {
      session_ttl:                TimeDelta::hours(1),
      require_email_confirmation: false,
    }
  }
}

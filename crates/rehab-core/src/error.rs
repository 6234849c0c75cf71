//! Error types for `rehab-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::validate::ValidationErrors;

/// Why an authentication request was refused.
///
/// These are user-facing failures: the caller shows them as a notice and the
/// process carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("an account with this email already exists")]
  EmailTaken,

  #[error("email address has not been confirmed")]
  EmailNotConfirmed,

  #[error("password must be at least {0} characters long")]
  WeakPassword(usize),

  #[error("session token is invalid or expired")]
  InvalidToken,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Auth(#[from] AuthFailure),

  #[error(transparent)]
  Invalid(#[from] ValidationErrors),

  #[error("patient not found: {0}")]
  PatientNotFound(Uuid),

  #[error("profile not found: {0}")]
  ProfileNotFound(Uuid),

  #[error("activity not found: {0}")]
  ActivityNotFound(Uuid),

  #[error("activity {0} is already completed")]
  AlreadyCompleted(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Implemented by backend error types that may wrap a core [`Error`].
///
/// Higher layers use it to pick a status code or notice without knowing the
/// concrete backend.
pub trait CoreErrorSource {
  fn core_error(&self) -> Option<&Error>;

  /// Shortcut for the auth failure carried by this error, if any.
  fn auth_failure(&self) -> Option<&AuthFailure> {
    match self.core_error()? {
      Error::Auth(f) => Some(f),
      _ => None,
    }
  }
}

impl CoreErrorSource for Error {
  fn core_error(&self) -> Option<&Error> { Some(self) }
}

impl CoreErrorSource for std::convert::Infallible {
  fn core_error(&self) -> Option<&Error> { match *self {} }
}

//! Error type for `rehab-store-sqlite`.

use rehab_core::CoreErrorSource;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] rehab_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl From<rehab_core::AuthFailure> for Error {
  fn from(f: rehab_core::AuthFailure) -> Self { Self::Core(f.into()) }
}

impl CoreErrorSource for Error {
  fn core_error(&self) -> Option<&rehab_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

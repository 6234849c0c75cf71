//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rehab_core::{CoreErrorSource, validate::ValidationErrors};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Invalid(ValidationErrors),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a store error by the core error it carries, if any.
  pub fn store<E>(e: E) -> Self
  where
    E: CoreErrorSource + std::error::Error + Send + Sync + 'static,
  {
    use rehab_core::Error as Core;
    match e.core_error() {
      Some(
        Core::PatientNotFound(_) | Core::ProfileNotFound(_) | Core::ActivityNotFound(_),
      ) => Self::NotFound(e.to_string()),
      Some(Core::AlreadyCompleted(_)) => Self::Conflict(e.to_string()),
      Some(Core::Invalid(v)) => Self::Invalid(v.clone()),
      Some(Core::Auth(_)) => Self::BadRequest(e.to_string()),
      _ => Self::Store(Box::new(e)),
    }
  }
}

impl From<ValidationErrors> for ApiError {
  fn from(v: ValidationErrors) -> Self { Self::Invalid(v) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Invalid(v) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": "invalid form", "fields": v.errors }),
      ),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}

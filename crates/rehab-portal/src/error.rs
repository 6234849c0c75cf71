//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rehab_core::{AuthFailure, CoreErrorSource, validate::ValidationErrors};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("not found: {0}")]
  NotFound(String),
  #[error(transparent)]
  Auth(#[from] AuthFailure),
  #[error(transparent)]
  Invalid(#[from] ValidationErrors),
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Surface refusals carried by a collaborator error as [`Error::Auth`] or
  /// [`Error::Invalid`]; anything else is a store failure.
  pub fn store<E>(e: E) -> Self
  where
    E: CoreErrorSource + std::error::Error + Send + Sync + 'static,
  {
    if let Some(failure) = e.auth_failure() {
      return Self::Auth(failure.clone());
    }
    if let Some(rehab_core::Error::Invalid(v)) = e.core_error() {
      return Self::Invalid(v.clone());
    }
    Self::Store(Box::new(e))
  }
}

fn auth_status(failure: &AuthFailure) -> StatusCode {
  match failure {
    AuthFailure::InvalidCredentials | AuthFailure::InvalidToken => StatusCode::UNAUTHORIZED,
    AuthFailure::EmailTaken => StatusCode::CONFLICT,
    AuthFailure::EmailNotConfirmed => StatusCode::FORBIDDEN,
    AuthFailure::WeakPassword(_) => StatusCode::UNPROCESSABLE_ENTITY,
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      Error::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": "unauthorized" })),
      Error::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      Error::Auth(f) => {
        tracing::info!(failure = %f, "auth request refused");
        (auth_status(f), json!({ "error": f.to_string(), "failure": f }))
      }
      Error::Invalid(v) => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": "invalid form", "fields": v.errors }),
      ),
      Error::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
    };
    (status, Json(body)).into_response()
  }
}

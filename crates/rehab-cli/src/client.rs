//! Async HTTP client wrapping the portal's JSON API.
//!
//! [`ApiClient`] is the client-side auth collaborator: it holds the current
//! session, persists it to a JSON file so later invocations resume it, and
//! broadcasts an [`AuthEvent`] whenever the session changes.

use std::{
  path::PathBuf,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::Utc;
use rehab_core::{
  AuthFailure,
  profile::Profile,
  session::{Session, SignUpOutcome, User},
  validate::{SignUpForm, ValidationErrors},
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header, redirect};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::session::{AuthClient, AuthEvent};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Auth(AuthFailure),

  #[error(transparent)]
  Invalid(ValidationErrors),

  #[error("not signed in")]
  NotSignedIn,

  /// The server's route guard turned the request away.
  #[error("redirected to {0}")]
  Redirected(String),

  #[error("{status}: {message}")]
  Api { status: StatusCode, message: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("session file error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Shape of the portal's error bodies.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  error:   String,
  failure: Option<AuthFailure>,
  fields:  Option<Vec<rehab_core::validate::FieldError>>,
}

/// Turn a non-success response into an [`Error`].
async fn error_from(resp: Response) -> Error {
  let status = resp.status();
  if status.is_redirection() {
    let location = resp
      .headers()
      .get(header::LOCATION)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .to_owned();
    return Error::Redirected(location);
  }

  let body: ErrorBody = resp.json().await.unwrap_or_default();
  match (body.failure, body.fields) {
    (Some(failure), _) => Error::Auth(failure),
    (None, Some(errors)) => Error::Invalid(ValidationErrors { errors }),
    (None, None) => Error::Api { status, message: body.error },
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Connection settings for the portal.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url:     String,
  /// Where the session is persisted between invocations.
  pub session_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct Credentials<'a> {
  email:    &'a str,
  password: &'a str,
}

/// Async HTTP client for the portal.
///
/// Cheap to clone; clones share the session and the event channel.
#[derive(Clone)]
pub struct ApiClient {
  client:  Client,
  config:  ApiConfig,
  session: Arc<Mutex<Option<Session>>>,
  events:  broadcast::Sender<AuthEvent>,
}

impl ApiClient {
  /// Build a client, resuming the persisted session if there is one.
  pub fn new(config: ApiConfig) -> Result<Self, Error> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .redirect(redirect::Policy::none())
      .build()?;

    let session = match &config.session_file {
      Some(path) if path.exists() => {
        let raw = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Session>(&raw) {
          Ok(s) => Some(s),
          Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
            None
          }
        }
      }
      _ => None,
    };

    let (events, _) = broadcast::channel(16);
    Ok(Self { client, config, session: Arc::new(Mutex::new(session)), events })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn current(&self) -> Option<Session> {
    self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn access_token(&self) -> Result<String, Error> {
    self.current().map(|s| s.access_token).ok_or(Error::NotSignedIn)
  }

  /// Replace the held session and persist it. `None` removes the file.
  async fn store_session(&self, session: Option<Session>) -> Result<(), Error> {
    *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();

    let Some(path) = &self.config.session_file else {
      return Ok(());
    };
    match session {
      Some(s) => {
        if let Some(dir) = path.parent() {
          tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&s)?).await?;
      }
      None => match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
      },
    }
    Ok(())
  }

  fn emit(&self, event: AuthEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }

  async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, Error> {
    let resp = req.send().await?;
    if !resp.status().is_success() {
      return Err(error_from(resp).await);
    }
    Ok(resp.json().await?)
  }

  /// `POST /auth/refresh`
  async fn refresh(&self, refresh_token: &str) -> Result<Session, Error> {
    let req = self
      .client
      .post(self.url("/auth/refresh"))
      .json(&json!({ "refresh_token": refresh_token }));
    self.send(req).await
  }

  /// `POST /auth/verify`
  pub async fn verify_email(&self, token: &str) -> Result<User, Error> {
    let req = self.client.post(self.url("/auth/verify")).json(&json!({ "token": token }));
    self.send(req).await
  }

  // ── Authenticated data requests ───────────────────────────────────────────

  /// Send an authenticated request to `path` and decode the JSON reply.
  pub async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    query: &[(&str, String)],
    body: Option<&serde_json::Value>,
  ) -> Result<T, Error> {
    let mut req = self
      .client
      .request(method.clone(), self.url(path))
      .bearer_auth(self.access_token()?)
      .query(query);
    if let Some(body) = body {
      req = req.json(body);
    }
    tracing::debug!(%method, path, "api request");
    self.send(req).await
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, Error> {
    self.request(Method::GET, path, query, None).await
  }

  pub async fn post<T: DeserializeOwned>(
    &self,
    path: &str,
    body: Option<&serde_json::Value>,
  ) -> Result<T, Error> {
    self.request(Method::POST, path, &[], body).await
  }

  pub async fn put<T: DeserializeOwned>(
    &self,
    path: &str,
    body: &serde_json::Value,
  ) -> Result<T, Error> {
    self.request(Method::PUT, path, &[], Some(body)).await
  }
}

// ─── Auth collaborator ───────────────────────────────────────────────────────

impl AuthClient for ApiClient {
  type Error = Error;

  async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
    let req = self
      .client
      .post(self.url("/auth/token"))
      .json(&Credentials { email, password });
    let session: Session = self.send(req).await?;
    self.store_session(Some(session.clone())).await?;
    self.emit(AuthEvent::SignedIn(session.clone()));
    Ok(session)
  }

  async fn sign_up(&self, form: &SignUpForm) -> Result<SignUpOutcome, Error> {
    let req = self.client.post(self.url("/auth/signup")).json(form);
    let outcome: SignUpOutcome = self.send(req).await?;
    if let Some(session) = &outcome.session {
      self.store_session(Some(session.clone())).await?;
      self.emit(AuthEvent::SignedIn(session.clone()));
    }
    Ok(outcome)
  }

  async fn sign_out(&self) -> Result<(), Error> {
    let Some(session) = self.current() else {
      return Ok(());
    };
    let remote = self
      .client
      .post(self.url("/auth/logout"))
      .bearer_auth(&session.access_token)
      .send()
      .await;

    // Local state goes regardless of what the server said.
    self.store_session(None).await?;
    self.emit(AuthEvent::SignedOut);

    let resp = remote?;
    if !resp.status().is_success() {
      return Err(error_from(resp).await);
    }
    Ok(())
  }

  async fn get_session(&self) -> Result<Option<Session>, Error> {
    let Some(session) = self.current() else {
      return Ok(None);
    };
    if !session.is_expired_at(Utc::now()) {
      return Ok(Some(session));
    }

    match self.refresh(&session.refresh_token).await {
      Ok(fresh) => {
        self.store_session(Some(fresh.clone())).await?;
        self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
        Ok(Some(fresh))
      }
      Err(Error::Auth(failure)) => {
        tracing::info!(%failure, "stored session could not be refreshed");
        self.store_session(None).await?;
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  async fn fetch_profile(&self) -> Result<Option<Profile>, Error> {
    let resp = self
      .client
      .get(self.url("/auth/profile"))
      .bearer_auth(self.access_token()?)
      .send()
      .await?;
    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      s if s.is_success() => Ok(Some(resp.json().await?)),
      _ => Err(error_from(resp).await),
    }
  }

  fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }
}

//! Handlers for the `/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/auth` | Login view; echoes a safe `from` |
//! | `POST` | `/auth/signup` | Body: [`SignUpForm`]; 201 with `{user, session?, notice}` |
//! | `POST` | `/auth/token` | Body: [`SignInForm`]; session + cookie |
//! | `POST` | `/auth/refresh` | Body: `{"refresh_token":"..."}` |
//! | `POST` | `/auth/verify` | Body: `{"token":"..."}` |
//! | `POST` | `/auth/logout` | Always 204; clears the cookie |
//! | `GET`  | `/auth/session` | Current user, 401 without a live token |
//! | `GET`  | `/auth/profile` | Current profile, 404 when missing |

use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{AppendHeaders, IntoResponse},
};
use rehab_core::{
  access::ROOT_PATH,
  notice::Notice,
  profile::Profile,
  session::{Session, User},
  store::{AuthService, CareStore},
  validate::{MIN_PASSWORD_LEN, SignInForm, SignUpForm},
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  error::Error,
  identity::{Identity, SESSION_COOKIE, access_token},
};

// ─── Cookies ──────────────────────────────────────────────────────────────────

fn session_cookie(session: &Session, ttl_secs: u64) -> String {
  format!(
    "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_secs}",
    session.access_token
  )
}

fn cleared_cookie() -> String {
  format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

// ─── Login view ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
  pub from: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginView {
  pub view:             String,
  /// Where to go after signing in.
  pub from:             String,
  pub min_password_len: usize,
}

/// Only same-origin paths are accepted as a post-login target.
fn safe_from(from: Option<String>) -> String {
  from
    .filter(|f| f.starts_with('/') && !f.starts_with("//") && !f.starts_with("/\\"))
    .unwrap_or_else(|| ROOT_PATH.to_owned())
}

/// `GET /auth[?from=...]`
pub async fn login_view(Query(params): Query<LoginParams>) -> Json<LoginView> {
  Json(LoginView {
    view:             "login".into(),
    from:             safe_from(params.from),
    min_password_len: MIN_PASSWORD_LEN,
  })
}

// ─── Sign-up ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
  pub user:    User,
  /// `None` means the address must be confirmed first.
  pub session: Option<Session>,
  pub notice:  Notice,
}

/// `POST /auth/signup`
pub async fn sign_up<A, S>(
  State(state): State<AppState<A, S>>,
  Json(form): Json<SignUpForm>,
) -> Result<impl IntoResponse, Error>
where
  A: AuthService,
  S: CareStore,
{
  let account = form.validate(Some(state.config.default_role))?;
  let email = account.email.clone();
  let outcome = state.auth.sign_up(account).await.map_err(Error::store)?;

  if let Some(token) = &outcome.confirmation_token {
    // No mail transport: operators relay the token.
    tracing::info!(%email, confirmation_token = %token, "email confirmation pending");
  }

  let (notice, cookie) = match &outcome.session {
    Some(session) => (
      Notice::info("Registration successful!", "Your account has been created."),
      Some(session_cookie(session, state.config.session_ttl_secs)),
    ),
    None => (
      Notice::info(
        "Check your email",
        "Please check your email to verify your account before logging in.",
      ),
      None,
    ),
  };

  let body = SignUpResponse { user: outcome.user, session: outcome.session, notice };
  Ok((StatusCode::CREATED, AppendHeaders(cookie.map(|c| (header::SET_COOKIE, c))), Json(body)))
}

// ─── Sign-in ──────────────────────────────────────────────────────────────────

/// `POST /auth/token`
pub async fn token<A, S>(
  State(state): State<AppState<A, S>>,
  Json(form): Json<SignInForm>,
) -> Result<impl IntoResponse, Error>
where
  A: AuthService,
  S: CareStore,
{
  form.validate()?;
  let session = state
    .auth
    .sign_in_with_password(&form.email, &form.password)
    .await
    .map_err(Error::store)?;
  tracing::info!(user = %session.user.id, "signed in");

  let cookie = session_cookie(&session, state.config.session_ttl_secs);
  Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
  pub refresh_token: String,
}

/// `POST /auth/refresh`
pub async fn refresh<A, S>(
  State(state): State<AppState<A, S>>,
  Json(body): Json<RefreshBody>,
) -> Result<impl IntoResponse, Error>
where
  A: AuthService,
  S: CareStore,
{
  let session = state
    .auth
    .refresh_session(&body.refresh_token)
    .await
    .map_err(Error::store)?;
  let cookie = session_cookie(&session, state.config.session_ttl_secs);
  Ok((AppendHeaders([(header::SET_COOKIE, cookie)]), Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub token: String,
}

/// `POST /auth/verify`
pub async fn verify<A, S>(
  State(state): State<AppState<A, S>>,
  Json(body): Json<VerifyBody>,
) -> Result<Json<User>, Error>
where
  A: AuthService,
  S: CareStore,
{
  let user = state.auth.confirm_email(&body.token).await.map_err(Error::store)?;
  tracing::info!(user = %user.id, "email confirmed");
  Ok(Json(user))
}

// ─── Sign-out ─────────────────────────────────────────────────────────────────

/// `POST /auth/logout`
pub async fn logout<A, S>(
  State(state): State<AppState<A, S>>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, Error>
where
  A: AuthService,
  S: CareStore,
{
  if let Some(token) = access_token(&headers) {
    state.auth.sign_out(token).await.map_err(Error::store)?;
  }
  Ok((StatusCode::NO_CONTENT, AppendHeaders([(header::SET_COOKIE, cleared_cookie())])))
}

// ─── Current identity ─────────────────────────────────────────────────────────

/// `GET /auth/session`
pub async fn session(identity: Identity) -> Json<User> { Json(identity.user) }

/// `GET /auth/profile`
pub async fn profile(identity: Identity) -> Result<Json<Profile>, Error> {
  identity
    .profile
    .map(Json)
    .ok_or_else(|| Error::NotFound(format!("no profile for user {}", identity.user.id)))
}

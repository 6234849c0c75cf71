//! The RehabCare portal server.
//!
//! Serves the `/auth` endpoints, the root route, one dashboard per role and
//! the role-scoped JSON API from [`rehab_api`], all behind the route guard.
//!
//! | Path | Scope |
//! |------|-------|
//! | `/auth/**` | public |
//! | `/` | any session |
//! | `/admin/**`, `/therapist/**`, `/staff/**`, `/family/**` | that role only |
//! | anything else | not found |

pub mod auth;
pub mod dashboard;
pub mod error;
pub mod guard;
pub mod identity;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router, middleware,
  routing::{get, post},
};
use chrono::TimeDelta;
use rehab_core::{
  Role,
  session::AuthPolicy,
  store::{AuthService, CareStore},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `rehab.toml` and
/// `REHAB_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                       String,
  pub port:                       u16,
  pub store_path:                 PathBuf,
  /// Lifetime of an access token and its cookie.
  pub session_ttl_secs:           u64,
  /// Sign-ups get no session until the address is confirmed.
  pub require_email_confirmation: bool,
  /// Role given to every self-registered account.
  pub default_role:               Role,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                       "127.0.0.1".into(),
      port:                       8080,
      store_path:                 PathBuf::from("rehab.db"),
      session_ttl_secs:           3600,
      require_email_confirmation: false,
      default_role:               Role::Staff,
    }
  }
}

impl ServerConfig {
  pub fn auth_policy(&self) -> AuthPolicy {
    let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
    AuthPolicy {
      session_ttl:                TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX),
      require_email_confirmation: self.require_email_confirmation,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the portal's own handlers.
pub struct AppState<A, S> {
  pub auth:   Arc<A>,
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
}

impl<A, S> Clone for AppState<A, S> {
  fn clone(&self) -> Self {
    Self {
      auth:   self.auth.clone(),
      store:  self.store.clone(),
      config: self.config.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// A role subtree: its dashboard at the subtree root plus its API routes.
fn subtree<A, S>(
  state: &AppState<A, S>,
  dashboard: axum::routing::MethodRouter<AppState<A, S>>,
  api: Router,
) -> Router
where
  A: AuthService + 'static,
  S: CareStore + 'static,
{
  Router::new().route("/", dashboard).with_state(state.clone()).merge(api)
}

/// Build the portal [`Router`].
pub fn router<A, S>(state: AppState<A, S>) -> Router
where
  A: AuthService + 'static,
  S: CareStore + 'static,
{
  let entry = Router::new()
    .route("/", get(dashboard::root))
    .route("/auth", get(auth::login_view))
    .route("/auth/signup", post(auth::sign_up::<A, S>))
    .route("/auth/token", post(auth::token::<A, S>))
    .route("/auth/refresh", post(auth::refresh::<A, S>))
    .route("/auth/verify", post(auth::verify::<A, S>))
    .route("/auth/logout", post(auth::logout::<A, S>))
    .route("/auth/session", get(auth::session))
    .route("/auth/profile", get(auth::profile))
    .with_state(state.clone());

  let store = state.store.clone();
  Router::new()
    .merge(entry)
    .nest(
      "/admin",
      subtree(&state, get(dashboard::admin::<A, S>), rehab_api::admin_router(store.clone())),
    )
    .nest(
      "/therapist",
      subtree(
        &state,
        get(dashboard::therapist::<A, S>),
        rehab_api::therapist_router(store.clone()),
      ),
    )
    .nest(
      "/staff",
      subtree(&state, get(dashboard::staff::<A, S>), rehab_api::staff_router(store.clone())),
    )
    .nest(
      "/family",
      subtree(&state, get(dashboard::family::<A, S>), rehab_api::family_router(store)),
    )
    .fallback(dashboard::not_found)
    .layer(middleware::from_fn_with_state(state, guard::guard::<A, S>))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
  };
  use rehab_core::{session::NewAccount, store::AuthService};
  use rehab_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn app(require_email_confirmation: bool) -> (Router, Arc<SqliteStore>) {
    let config = ServerConfig { require_email_confirmation, ..ServerConfig::default() };
    let store = Arc::new(
      SqliteStore::open_in_memory()
        .await
        .unwrap()
        .with_auth_policy(config.auth_policy()),
    );
    let state = AppState {
      auth:   store.clone(),
      store:  store.clone(),
      config: Arc::new(config),
    };
    (router(state), store)
  }

  async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, headers, value)
  }

  fn location(headers: &HeaderMap) -> &str {
    headers.get(header::LOCATION).unwrap().to_str().unwrap()
  }

  fn signup_body(email: &str, password: &str) -> Value {
    json!({
      "email": email,
      "password": password,
      "first_name": "Ada",
      "last_name": "Lovelace",
    })
  }

  /// Register through the API and return `(user id, access token)`.
  async fn register(app: &Router, email: &str) -> (uuid::Uuid, String) {
    let (status, _, body) =
      send(app, "POST", "/auth/signup", None, Some(signup_body(email, "secret1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    let token = body["session"]["access_token"].as_str().unwrap().to_owned();
    (id, token)
  }

  // ── Guard ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn anonymous_is_sent_to_login_with_from() {
    let (app, _) = app(false).await;
    let (status, headers, _) = send(&app, "GET", "/staff", None, None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth?from=%2Fstaff");

    let (_, headers, _) = send(&app, "GET", "/", None, None).await;
    assert_eq!(location(&headers), "/auth?from=%2F");
  }

  #[tokio::test]
  async fn wrong_role_goes_to_own_home() {
    let (app, _) = app(false).await;
    let (_, token) = register(&app, "staff@rehab.test").await;

    let (status, headers, _) = send(&app, "GET", "/admin/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/staff");

    let (status, headers, _) = send(&app, "GET", "/", Some(&token), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/staff");

    let (status, _, body) = send(&app, "GET", "/staff", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["welcome"], "Ada Lovelace");
    assert_eq!(body["today"]["completion_rate"], 0.0);
  }

  #[tokio::test]
  async fn no_role_renders_root_and_restricted_routes_bounce_there() {
    let (app, store) = app(false).await;
    let (id, token) = register(&app, "nobody@rehab.test").await;
    store.set_role(id, None).await.unwrap();

    let (status, _, body) = send(&app, "GET", "/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], "no_role");

    let (status, headers, _) = send(&app, "GET", "/staff", Some(&token), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");
  }

  #[tokio::test]
  async fn unknown_paths_are_not_found() {
    let (app, _) = app(false).await;
    let (status, _, body) = send(&app, "GET", "/treatments", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["view"], "not_found");
    assert_eq!(body["path"], "/treatments");

    // Look-alike prefixes are not role subtrees.
    let (status, _, _) = send(&app, "GET", "/staffroom", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn session_cookie_is_accepted() {
    let (app, _) = app(false).await;
    let (_, token) = register(&app, "cookie@rehab.test").await;

    let req = Request::builder()
      .uri("/staff")
      .header(header::COOKIE, format!("rehab_session={token}"))
      .body(Body::empty())
      .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Auth ────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn login_view_sanitises_from() {
    let (app, _) = app(false).await;
    let (status, _, body) = send(&app, "GET", "/auth?from=%2Fstaff%2Fpatients", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["view"], "login");
    assert_eq!(body["from"], "/staff/patients");

    let (_, _, body) = send(&app, "GET", "/auth?from=%2F%2Fevil.example", None, None).await;
    assert_eq!(body["from"], "/");
  }

  #[tokio::test]
  async fn sign_up_sets_cookie_and_notice() {
    let (app, _) = app(false).await;
    let (status, headers, body) =
      send(&app, "POST", "/auth/signup", None, Some(signup_body("new@rehab.test", "secret1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["notice"]["title"], "Registration successful!");
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("rehab_session="));

    let token = body["session"]["access_token"].as_str().unwrap();
    let (status, _, profile) = send(&app, "GET", "/auth/profile", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["role"], "staff");
  }

  #[tokio::test]
  async fn short_password_is_rejected_before_the_store() {
    let (app, store) = app(false).await;
    let (status, _, body) =
      send(&app, "POST", "/auth/signup", None, Some(signup_body("short@rehab.test", "12345"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0]["field"], "password");
    assert!(store.find_user_by_email("short@rehab.test").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn duplicate_email_conflicts() {
    let (app, _) = app(false).await;
    register(&app, "dup@rehab.test").await;
    let (status, _, body) =
      send(&app, "POST", "/auth/signup", None, Some(signup_body("dup@rehab.test", "secret1"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["failure"], "email_taken");
  }

  #[tokio::test]
  async fn wrong_password_is_unauthorized() {
    let (app, _) = app(false).await;
    register(&app, "pw@rehab.test").await;
    let body = json!({ "email": "pw@rehab.test", "password": "not-it" });
    let (status, _, body) = send(&app, "POST", "/auth/token", None, Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["failure"], "invalid_credentials");
  }

  #[tokio::test]
  async fn confirmation_gates_sign_in() {
    let (app, store) = app(true).await;

    let (status, headers, body) =
      send(&app, "POST", "/auth/signup", None, Some(signup_body("c1@rehab.test", "secret1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session"], Value::Null);
    assert_eq!(body["notice"]["title"], "Check your email");
    assert!(headers.get(header::SET_COOKIE).is_none());

    let creds = json!({ "email": "c1@rehab.test", "password": "secret1" });
    let (status, _, body) = send(&app, "POST", "/auth/token", None, Some(creds)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["failure"], "email_not_confirmed");

    // The token only reaches the operator log, so sign up directly to see it.
    let outcome = store
      .sign_up(NewAccount {
        email:      "c2@rehab.test".into(),
        password:   "secret1".into(),
        first_name: "Con".into(),
        last_name:  "Firm".into(),
        role:       Some(Role::Staff),
      })
      .await
      .unwrap();
    let token = outcome.confirmation_token.unwrap();

    let (status, _, user) =
      send(&app, "POST", "/auth/verify", None, Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!user["email_confirmed_at"].is_null());

    let (status, _, _) =
      send(&app, "POST", "/auth/verify", None, Some(json!({ "token": token }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let creds = json!({ "email": "c2@rehab.test", "password": "secret1" });
    let (status, _, _) = send(&app, "POST", "/auth/token", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn logout_revokes_the_token() {
    let (app, _) = app(false).await;
    let (_, token) = register(&app, "out@rehab.test").await;

    let (status, headers, _) = send(&app, "POST", "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let (status, headers, _) = send(&app, "GET", "/staff", Some(&token), None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth?from=%2Fstaff");

    let (status, _, _) = send(&app, "GET", "/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Logging out twice, or anonymously, still succeeds.
    let (status, _, _) = send(&app, "POST", "/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
  }

  #[tokio::test]
  async fn refresh_rotates_the_session() {
    let (app, _) = app(false).await;
    let (status, _, body) =
      send(&app, "POST", "/auth/signup", None, Some(signup_body("r@rehab.test", "secret1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let old_access = body["session"]["access_token"].as_str().unwrap().to_owned();
    let refresh = body["session"]["refresh_token"].as_str().unwrap().to_owned();

    let (status, _, fresh) =
      send(&app, "POST", "/auth/refresh", None, Some(json!({ "refresh_token": refresh }))).await;
    assert_eq!(status, StatusCode::OK);
    let new_access = fresh["access_token"].as_str().unwrap();

    let (status, _, _) = send(&app, "GET", "/auth/session", Some(&old_access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, user) = send(&app, "GET", "/auth/session", Some(new_access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "r@rehab.test");
  }

  // ── Role subtrees ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn staff_api_runs_as_the_caller() {
    let (app, _) = app(false).await;
    let (_, token) = register(&app, "desk@rehab.test").await;

    let form = json!({
      "first_name": "Grace",
      "last_name": "Hopper",
      "date_of_birth": "1940-02-02",
      "admission_date": "2024-04-01",
    });
    let (status, _, patient) =
      send(&app, "POST", "/staff/patients", Some(&token), Some(form)).await;
    assert_eq!(status, StatusCode::CREATED);

    let activity = json!({
      "patient_id": patient["id"],
      "name": "Morning walk",
      "scheduled_date": "2024-04-02T09:00:00Z",
    });
    let (status, _, activity) =
      send(&app, "POST", "/staff/activities", Some(&token), Some(activity)).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/staff/activities/{}/complete", activity["id"].as_str().unwrap());
    let (status, _, done) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!done["completed_at"].is_null());

    let (_, _, dashboard) = send(&app, "GET", "/staff", Some(&token), None).await;
    assert_eq!(dashboard["active_patients"], 1);
    assert_eq!(dashboard["recent_activities"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn admin_dashboard_counts_users_by_role() {
    let (app, store) = app(false).await;
    let (admin_id, admin) = register(&app, "admin@rehab.test").await;
    store.set_role(admin_id, Some(Role::Admin)).await.unwrap();
    let (unassigned, _) = register(&app, "floating@rehab.test").await;
    store.set_role(unassigned, None).await.unwrap();
    register(&app, "desk@rehab.test").await;

    let (status, _, body) = send(&app, "GET", "/admin", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["total"], 3);
    assert_eq!(body["users"]["by_role"]["admin"], 1);
    assert_eq!(body["users"]["by_role"]["staff"], 1);
    assert_eq!(body["users"]["by_role"]["family"], 0);
    assert_eq!(body["users"]["unassigned"], 1);
    assert_eq!(body["notices"], json!([]));
  }

  #[tokio::test]
  async fn family_dashboard_lists_linked_patients() {
    let (app, store) = app(false).await;
    let (admin_id, admin) = register(&app, "admin@rehab.test").await;
    store.set_role(admin_id, Some(Role::Admin)).await.unwrap();
    let (family_id, family) = register(&app, "kin@rehab.test").await;
    store.set_role(family_id, Some(Role::Family)).await.unwrap();

    let form = json!({
      "first_name": "Alan",
      "last_name": "Turing",
      "date_of_birth": "1912-06-23",
      "admission_date": "2024-04-01",
    });
    let (_, _, patient) = send(&app, "POST", "/admin/patients", Some(&admin), Some(form)).await;
    let uri = format!("/admin/patients/{}/family", patient["id"].as_str().unwrap());
    let link = json!({ "family_member_id": family_id, "relationship": "Nephew" });
    let (status, _, _) = send(&app, "POST", &uri, Some(&admin), Some(link)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(&app, "GET", "/family", Some(&family), None).await;
    assert_eq!(status, StatusCode::OK);
    let patients = body["patients"].as_array().unwrap();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["patient"]["last_name"], "Turing");
    assert_eq!(patients[0]["link"]["relationship"], "Nephew");
  }
}

//! JSON REST API for RehabCare care records.
//!
//! Exposes one axum [`Router`] per role subtree, backed by any
//! [`rehab_core::store::CareStore`]. Authentication and the route guard are
//! the caller's responsibility: handlers that act on behalf of the user read
//! the caller's [`Profile`](rehab_core::profile::Profile) from a request
//! extension the guard inserts.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/staff", rehab_api::staff_router(store.clone()))
//! ```

pub mod activities;
pub mod error;
pub mod links;
pub mod patients;
pub mod progress;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use rehab_core::store::CareStore;

pub use error::ApiError;

/// Front-desk routes: patients, activities and progress notes.
pub fn staff_router<S>(store: Arc<S>) -> Router<()>
where
  S: CareStore + 'static,
{
  Router::new()
    // Patients
    .route("/patients", get(patients::list::<S>).post(patients::create::<S>))
    .route("/patients/new", get(patients::form_defaults))
    .route("/patients/{id}", get(patients::get_one::<S>))
    .route("/patients/{id}/activities", get(patients::activities::<S>))
    .route("/patients/{id}/progress", get(patients::progress::<S>))
    // Activities
    .route("/activities", get(activities::list::<S>).post(activities::create::<S>))
    .route("/activities/options", get(activities::form_options::<S>))
    .route("/activities/{id}/complete", post(activities::complete::<S>))
    // Progress
    .route("/progress", get(progress::list::<S>).post(progress::create::<S>))
    .with_state(store)
}

/// Administration: users, roles, patients and their links.
pub fn admin_router<S>(store: Arc<S>) -> Router<()>
where
  S: CareStore + 'static,
{
  Router::new()
    .route("/users", get(users::list::<S>))
    .route("/users/{id}/role", put(users::set_role::<S>))
    .route("/patients", get(patients::list::<S>).post(patients::create::<S>))
    .route("/patients/{id}", get(patients::get_one::<S>))
    .route("/patients/{id}/therapists", post(links::assign_therapist::<S>))
    .route("/patients/{id}/family", post(links::link_family::<S>))
    .with_state(store)
}

/// Therapist routes: assigned patients and their own notes.
pub fn therapist_router<S>(store: Arc<S>) -> Router<()>
where
  S: CareStore + 'static,
{
  Router::new()
    .route("/patients", get(patients::assigned::<S>))
    .route("/patients/{id}", get(patients::get_one::<S>))
    .route("/patients/{id}/progress", get(patients::progress::<S>))
    .route("/progress", get(progress::mine::<S>).post(progress::create::<S>))
    .with_state(store)
}

/// Family routes: linked patients and their upcoming activities.
pub fn family_router<S>(store: Arc<S>) -> Router<()>
where
  S: CareStore + 'static,
{
  Router::new()
    .route("/patients", get(patients::linked::<S>))
    .route("/patients/{id}/activities", get(patients::linked_activities::<S>))
    .with_state(store)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    Extension,
    body::Body,
    http::{Request, StatusCode, header},
  };
  use rehab_core::{
    Role,
    profile::Profile,
    record::{NewPatient, PatientStatus},
    session::NewAccount,
    store::AuthService,
  };
  use rehab_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.unwrap())
  }

  async fn profile(store: &SqliteStore, email: &str, role: Role) -> Profile {
    let out = store
      .sign_up(NewAccount {
        email:      email.into(),
        password:   "secret1".into(),
        first_name: "Test".into(),
        last_name:  "User".into(),
        role:       Some(role),
      })
      .await
      .unwrap();
    store.get_profile(out.user.id).await.unwrap().unwrap()
  }

  async fn patient(store: &SqliteStore, first: &str, last: &str) -> uuid::Uuid {
    store
      .add_patient(NewPatient {
        first_name:              first.into(),
        last_name:               last.into(),
        date_of_birth:           chrono::NaiveDate::from_ymd_opt(1940, 2, 2).unwrap(),
        admission_date:          chrono::NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        expected_discharge_date: None,
        medical_history:         None,
        status:                  PatientStatus::Active,
      })
      .await
      .unwrap()
      .id
  }

  async fn call(
    router: Router<()>,
    caller: &Profile,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = router
      .layer(Extension(caller.clone()))
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  // ── Patients ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_patient_then_list() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;

    let form = json!({
      "first_name": "Grace",
      "last_name": "Hopper",
      "date_of_birth": "1940-02-02",
      "admission_date": "2024-04-01",
      "expected_discharge_date": ""
    });
    let (status, body) = call(staff_router(s.clone()), &staff, "POST", "/patients", Some(form)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "active");
    assert_eq!(body["expected_discharge_date"], Value::Null);

    let (status, body) = call(staff_router(s.clone()), &staff, "GET", "/patients?search=hop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn invalid_patient_form_lists_fields() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;

    let form = json!({
      "first_name": "G",
      "last_name": "Hopper",
      "date_of_birth": "02/02/1940",
      "admission_date": "2024-04-01"
    });
    let (status, body) = call(staff_router(s), &staff, "POST", "/patients", Some(form)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<_> = body["fields"]
      .as_array()
      .unwrap()
      .iter()
      .map(|f| f["field"].as_str().unwrap().to_owned())
      .collect();
    assert_eq!(fields, ["first_name", "date_of_birth"]);
  }

  #[tokio::test]
  async fn unknown_patient_is_404() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;
    let uri = format!("/patients/{}", uuid::Uuid::new_v4());
    let (status, body) = call(staff_router(s), &staff, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
  }

  #[tokio::test]
  async fn new_patient_form_defaults_to_today() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;
    let (status, body) = call(staff_router(s), &staff, "GET", "/patients/new", None).await;
    assert_eq!(status, StatusCode::OK);
    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(body["admission_date"], today);
    assert_eq!(body["status"], "active");
  }

  // ── Activities ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn schedule_and_complete_activity() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;
    let pid = patient(&s, "Grace", "Hopper").await;

    let form = json!({
      "patient_id": pid,
      "name": "Gait training",
      "scheduled_date": "2024-05-10T09:30"
    });
    let (status, created) = call(staff_router(s.clone()), &staff, "POST", "/activities", Some(form)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["scheduled_date"], "2024-05-10T09:30:00Z");

    let uri = format!("/activities/{}/complete", created["id"].as_str().unwrap());
    let (status, done) = call(staff_router(s.clone()), &staff, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["completed_by"], json!(staff.id));

    let (status, _) = call(staff_router(s.clone()), &staff, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, pending) =
      call(staff_router(s), &staff, "GET", "/activities?pending=true", None).await;
    assert!(pending.as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn scheduling_for_missing_patient_is_404() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;
    let form = json!({
      "patient_id": uuid::Uuid::new_v4(),
      "name": "Pool",
      "scheduled_date": "2024-05-10T09:30:00Z"
    });
    let (status, _) = call(staff_router(s), &staff, "POST", "/activities", Some(form)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn form_options_offer_active_patients_by_first_name() {
    let s = store().await;
    let staff = profile(&s, "s@b.co", Role::Staff).await;
    patient(&s, "Zoe", "Adams").await;
    patient(&s, "Grace", "Hopper").await;
    let (_, body) = call(staff_router(s), &staff, "GET", "/activities/options", None).await;
    assert_eq!(body["patients"][0]["name"], "Grace Hopper");
    assert_eq!(body["patients"][1]["name"], "Zoe Adams");
  }

  // ── Progress ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn therapist_notes_are_attributed_to_caller() {
    let s = store().await;
    let therapist = profile(&s, "t@b.co", Role::Therapist).await;
    let other = profile(&s, "o@b.co", Role::Therapist).await;
    let pid = patient(&s, "Grace", "Hopper").await;

    let form = json!({
      "patient_id": pid,
      "notes": "Walked 20 metres unaided.",
      "session_date": "2024-05-10"
    });
    let (status, note) =
      call(therapist_router(s.clone()), &therapist, "POST", "/progress", Some(form)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["therapist_id"], json!(therapist.id));

    let (_, mine) = call(therapist_router(s.clone()), &therapist, "GET", "/progress", None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = call(therapist_router(s), &other, "GET", "/progress", None).await;
    assert!(theirs.as_array().unwrap().is_empty());
  }

  // ── Admin ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_assigns_roles_and_links() {
    let s = store().await;
    let admin = profile(&s, "a@b.co", Role::Admin).await;
    let newcomer = profile(&s, "n@b.co", Role::Staff).await;
    let pid = patient(&s, "Grace", "Hopper").await;

    let uri = format!("/users/{}/role", newcomer.id);
    let (status, body) =
      call(admin_router(s.clone()), &admin, "PUT", &uri, Some(json!({ "role": "therapist" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "therapist");

    let uri = format!("/patients/{pid}/therapists");
    let body = json!({ "therapist_id": newcomer.id });
    let (status, _) = call(admin_router(s.clone()), &admin, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, assigned) = call(therapist_router(s.clone()), &newcomer, "GET", "/patients", None).await;
    assert_eq!(assigned[0]["id"], json!(pid));

    // A therapist is not a family member.
    let uri = format!("/patients/{pid}/family");
    let body = json!({ "family_member_id": newcomer.id, "relationship": "son" });
    let (status, _) = call(admin_router(s), &admin, "POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn admin_cannot_change_own_role() {
    let s = store().await;
    let admin = profile(&s, "a@b.co", Role::Admin).await;
    let uri = format!("/users/{}/role", admin.id);
    let (status, _) =
      call(admin_router(s), &admin, "PUT", &uri, Some(json!({ "role": null }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Family ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn family_sees_only_linked_patients() {
    let s = store().await;
    let family = profile(&s, "f@b.co", Role::Family).await;
    let linked = patient(&s, "Grace", "Hopper").await;
    let unlinked = patient(&s, "Alan", "Turing").await;
    s.link_family(linked, family.id, "daughter".into()).await.unwrap();

    let (_, list) = call(family_router(s.clone()), &family, "GET", "/patients", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["patient"]["id"], json!(linked));

    let uri = format!("/patients/{unlinked}/activities");
    let (status, _) = call(family_router(s), &family, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}

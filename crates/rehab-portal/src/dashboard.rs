//! Role dashboards, the root route and the not-found view.
//!
//! Dashboards are JSON view models. Each section is read independently; a
//! failed read leaves that section empty and adds an error [`Notice`], so a
//! dashboard request itself never fails on a store error.

use std::{collections::BTreeMap, fmt::Display};

use axum::{
  Extension, Json,
  extract::State,
  http::{StatusCode, Uri},
  response::{IntoResponse, Redirect, Response},
};
use chrono::{TimeDelta, Utc};
use rehab_core::{
  Role,
  access::role_home,
  notice::Notice,
  profile::Profile,
  record::{Activity, FamilyPatient, Patient, PatientProgress, PatientStatus, completion_rate},
  store::{ActivityQuery, AuthService, CareStore, PatientQuery, ProgressQuery, SortDirection},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{AppState, identity::Identity};

const RECENT_LIMIT: usize = 5;

/// Unwrap a section read, degrading to an empty section plus a notice.
fn section<T, E>(result: Result<T, E>, notices: &mut Vec<Notice>, what: &str) -> T
where
  T: Default,
  E: Display,
{
  match result {
    Ok(value) => value,
    Err(e) => {
      tracing::warn!(error = %e, "failed to load {what}");
      notices.push(Notice::error(format!("Failed to load {what}")));
      T::default()
    }
  }
}

// ─── Root and not-found ──────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct NoRoleView {
  pub view:        String,
  pub email:       String,
  pub title:       String,
  pub description: String,
}

/// `GET /`: a recognised role goes to its home; anyone else gets a static
/// view, so the redirect chain always ends here.
pub async fn root(Extension(identity): Extension<Identity>) -> Response {
  match identity.role() {
    Some(role) => Redirect::to(role_home(Some(role))).into_response(),
    None => Json(NoRoleView {
      view:        "no_role".into(),
      email:       identity.user.email,
      title:       "No role assigned".into(),
      description: "Your account does not have a role yet. Ask an administrator to assign one."
        .into(),
    })
    .into_response(),
  }
}

/// Fallback for every unmatched path.
pub async fn not_found(uri: Uri) -> impl IntoResponse {
  (
    StatusCode::NOT_FOUND,
    Json(serde_json::json!({
      "view": "not_found",
      "error": "page not found",
      "path": uri.path(),
    })),
  )
}

// ─── Admin ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PatientsOverview {
  pub total:  usize,
  pub active: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UsersOverview {
  pub total:      usize,
  /// Keyed by role name; every role is present.
  pub by_role:    BTreeMap<String, usize>,
  /// Profiles with a missing or unrecognised role.
  pub unassigned: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminDashboard {
  pub welcome:  String,
  pub patients: PatientsOverview,
  pub users:    UsersOverview,
  pub notices:  Vec<Notice>,
}

/// `GET /admin`
pub async fn admin<A, S>(
  State(state): State<AppState<A, S>>,
  Extension(caller): Extension<Profile>,
) -> Json<AdminDashboard>
where
  A: AuthService,
  S: CareStore,
{
  let mut notices = Vec::new();

  let patients: Vec<Patient> = section(
    state.store.list_patients(&PatientQuery::default()).await,
    &mut notices,
    "patients",
  );
  let profiles: Vec<Profile> =
    section(state.store.list_profiles(None).await, &mut notices, "users");

  let mut by_role: BTreeMap<String, usize> = Role::iter().map(|r| (r.to_string(), 0)).collect();
  let mut unassigned = 0;
  for p in &profiles {
    match p.role() {
      Some(r) => *by_role.entry(r.to_string()).or_default() += 1,
      None => unassigned += 1,
    }
  }

  Json(AdminDashboard {
    welcome:  caller.display_name(),
    patients: PatientsOverview {
      total:  patients.len(),
      active: patients.iter().filter(|p| p.status == Some(PatientStatus::Active)).count(),
    },
    users:    UsersOverview { total: profiles.len(), by_role, unassigned },
    notices,
  })
}

// ─── Therapist ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TherapistDashboard {
  pub welcome:      String,
  pub patients:     Vec<Patient>,
  pub recent_notes: Vec<PatientProgress>,
  pub notices:      Vec<Notice>,
}

/// `GET /therapist`
pub async fn therapist<A, S>(
  State(state): State<AppState<A, S>>,
  Extension(caller): Extension<Profile>,
) -> Json<TherapistDashboard>
where
  A: AuthService,
  S: CareStore,
{
  let mut notices = Vec::new();

  let patients = section(
    state.store.therapist_patients(caller.id).await,
    &mut notices,
    "patients",
  );
  let notes_query = ProgressQuery {
    therapist_id: Some(caller.id),
    limit: Some(RECENT_LIMIT),
    ..Default::default()
  };
  let recent_notes =
    section(state.store.list_progress(&notes_query).await, &mut notices, "progress notes");

  Json(TherapistDashboard { welcome: caller.display_name(), patients, recent_notes, notices })
}

// ─── Staff ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TodayActivities {
  pub activities:      Vec<Activity>,
  /// Percent of today's activities already completed.
  pub completion_rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StaffDashboard {
  pub welcome:           String,
  pub today:             TodayActivities,
  pub active_patients:   usize,
  pub recent_activities: Vec<Activity>,
  pub notices:           Vec<Notice>,
}

/// `GET /staff`
pub async fn staff<A, S>(
  State(state): State<AppState<A, S>>,
  Extension(caller): Extension<Profile>,
) -> Json<StaffDashboard>
where
  A: AuthService,
  S: CareStore,
{
  let mut notices = Vec::new();

  let start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
  let today_query = ActivityQuery {
    scheduled_from: Some(start),
    scheduled_before: Some(start + TimeDelta::days(1)),
    ..Default::default()
  };
  let activities: Vec<Activity> =
    section(state.store.list_activities(&today_query).await, &mut notices, "activities");

  let active_query = PatientQuery { status: Some(PatientStatus::Active), ..Default::default() };
  let active: Vec<Patient> =
    section(state.store.list_patients(&active_query).await, &mut notices, "patients");

  let recent_query = ActivityQuery {
    direction: SortDirection::Descending,
    limit: Some(RECENT_LIMIT),
    ..Default::default()
  };
  let recent_activities =
    section(state.store.list_activities(&recent_query).await, &mut notices, "recent activities");

  let pending = activities.iter().filter(|a| !a.is_completed()).count();
  notices.push(if pending > 0 {
    Notice::info("Pending activities", format!("{pending} activities pending today"))
  } else {
    Notice::info("No pending activities", "You're all caught up!")
  });

  Json(StaffDashboard {
    welcome: caller.display_name(),
    today: TodayActivities { completion_rate: completion_rate(&activities), activities },
    active_patients: active.len(),
    recent_activities,
    notices,
  })
}

// ─── Family ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkedPatient {
  #[serde(flatten)]
  pub linked:   FamilyPatient,
  pub upcoming: Vec<Activity>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FamilyDashboard {
  pub welcome:  String,
  pub patients: Vec<LinkedPatient>,
  pub notices:  Vec<Notice>,
}

/// `GET /family`
pub async fn family<A, S>(
  State(state): State<AppState<A, S>>,
  Extension(caller): Extension<Profile>,
) -> Json<FamilyDashboard>
where
  A: AuthService,
  S: CareStore,
{
  let mut notices = Vec::new();

  let links = section(state.store.family_patients(caller.id).await, &mut notices, "patients");

  let now = Utc::now();
  let mut patients = Vec::with_capacity(links.len());
  for linked in links {
    let query = ActivityQuery {
      patient_id: Some(linked.patient.id),
      scheduled_from: Some(now),
      limit: Some(RECENT_LIMIT),
      ..Default::default()
    };
    let upcoming = section(state.store.list_activities(&query).await, &mut notices, "activities");
    patients.push(LinkedPatient { linked, upcoming });
  }

  Json(FamilyDashboard { welcome: caller.display_name(), patients, notices })
}

//! Handlers for `/activities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/activities` | Optional `patient_id`, `from`, `before`, `pending`, `desc`, `limit` |
//! | `GET`  | `/activities/options` | Patients selectable in the schedule form |
//! | `POST` | `/activities` | Body: [`ActivityForm`]; returns 201 |
//! | `POST` | `/activities/{id}/complete` | Completed by the caller; 409 if already done |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rehab_core::{
  profile::Profile,
  record::{Activity, PatientStatus},
  store::{ActivityQuery, CareStore, PatientOrder, PatientQuery, SortDirection},
  validate::ActivityForm,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub patient_id: Option<Uuid>,
  /// Inclusive lower bound on the scheduled time.
  pub from:       Option<DateTime<Utc>>,
  /// Exclusive upper bound on the scheduled time.
  pub before:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub pending:    bool,
  /// Newest first instead of oldest first.
  #[serde(default)]
  pub desc:       bool,
  pub limit:      Option<usize>,
}

/// `GET /activities[?patient_id=...][&from=...][&before=...][&pending=true][&desc=true][&limit=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Activity>>, ApiError>
where
  S: CareStore,
{
  if matches!((params.from, params.before), (Some(from), Some(before)) if before < from) {
    return Err(ApiError::BadRequest("`before` precedes `from`".into()));
  }

  let query = ActivityQuery {
    patient_id:       params.patient_id,
    scheduled_from:   params.from,
    scheduled_before: params.before,
    pending_only:     params.pending,
    direction:        if params.desc { SortDirection::Descending } else { SortDirection::Ascending },
    limit:            params.limit,
  };
  let list = store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

// ─── Schedule ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientOption {
  pub id:   Uuid,
  pub name: String,
}

/// What the schedule form offers: active patients by last name.
#[derive(Debug, Serialize, Deserialize)]
pub struct FormOptions {
  pub patients: Vec<PatientOption>,
}

/// `GET /activities/options`
pub async fn form_options<S>(State(store): State<Arc<S>>) -> Result<Json<FormOptions>, ApiError>
where
  S: CareStore,
{
  let query = PatientQuery {
    status: Some(PatientStatus::Active),
    order:  PatientOrder::FirstName,
    ..Default::default()
  };
  let patients = store
    .list_patients(&query)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|p| PatientOption { id: p.id, name: p.full_name() })
    .collect();
  Ok(Json(FormOptions { patients }))
}

/// `POST /activities`: 404 if the patient does not exist.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(form): Json<ActivityForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
{
  let input = form.validate()?;
  let activity = store.schedule_activity(input).await.map_err(ApiError::store)?;
  tracing::info!(activity = %activity.id, patient = %activity.patient_id, "activity scheduled");
  Ok((StatusCode::CREATED, Json(activity)))
}

// ─── Complete ─────────────────────────────────────────────────────────────────

/// `POST /activities/{id}/complete`
pub async fn complete<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
  Path(id): Path<Uuid>,
) -> Result<Json<Activity>, ApiError>
where
  S: CareStore,
{
  let activity = store.complete_activity(id, caller.id).await.map_err(ApiError::store)?;
  tracing::info!(activity = %id, by = %caller.id, "activity completed");
  Ok(Json(activity))
}

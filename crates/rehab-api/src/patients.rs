//! Handlers for `/patients` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/patients` | Optional `status`, `search`, `order`, `limit` |
//! | `GET`  | `/patients/new` | Defaults for an empty patient form |
//! | `POST` | `/patients` | Body: [`PatientForm`]; returns 201 + stored patient |
//! | `GET`  | `/patients/{id}` | 404 if not found |
//! | `GET`  | `/patients/{id}/activities` | Newest scheduled first |
//! | `GET`  | `/patients/{id}/progress` | Newest session first |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use rehab_core::{
  profile::Profile,
  record::{Activity, FamilyPatient, Patient, PatientProgress, PatientStatus},
  store::{ActivityQuery, CareStore, PatientOrder, PatientQuery, ProgressQuery, SortDirection},
  validate::PatientForm,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameOrder {
  #[default]
  LastName,
  FirstName,
}

impl From<NameOrder> for PatientOrder {
  fn from(o: NameOrder) -> Self {
    match o {
      NameOrder::LastName => PatientOrder::LastName,
      NameOrder::FirstName => PatientOrder::FirstName,
    }
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status: Option<PatientStatus>,
  /// Case-insensitive match on first or last name.
  pub search: Option<String>,
  #[serde(default)]
  pub order:  NameOrder,
  pub limit:  Option<usize>,
}

/// `GET /patients[?status=...][&search=...][&order=first_name][&limit=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Patient>>, ApiError>
where
  S: CareStore,
{
  let query = PatientQuery {
    status: params.status,
    name:   params.search,
    order:  params.order.into(),
    limit:  params.limit,
  };
  let patients = store.list_patients(&query).await.map_err(ApiError::store)?;
  Ok(Json(patients))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `GET /patients/new`: an empty form with both dates set to today.
pub async fn form_defaults() -> Json<PatientForm> {
  Json(PatientForm::defaults(Utc::now().date_naive()))
}

/// `POST /patients`: 422 with field errors if the form is invalid.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(form): Json<PatientForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
{
  let input = form.validate()?;
  let patient = store.add_patient(input).await.map_err(ApiError::store)?;
  tracing::info!(patient = %patient.id, "patient admitted");
  Ok((StatusCode::CREATED, Json(patient)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /patients/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError>
where
  S: CareStore,
{
  let patient = store
    .get_patient(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("patient {id} not found")))?;
  Ok(Json(patient))
}

/// `GET /patients/{id}/activities`
pub async fn activities<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Activity>>, ApiError>
where
  S: CareStore,
{
  get_one(State(store.clone()), Path(id)).await?;
  let query = ActivityQuery {
    patient_id: Some(id),
    direction: SortDirection::Descending,
    ..Default::default()
  };
  let list = store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

/// `GET /patients/{id}/progress`
pub async fn progress<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<PatientProgress>>, ApiError>
where
  S: CareStore,
{
  get_one(State(store.clone()), Path(id)).await?;
  let query = ProgressQuery { patient_id: Some(id), ..Default::default() };
  let list = store.list_progress(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

// ─── Scoped to the caller ─────────────────────────────────────────────────────

/// `GET /therapist/patients`: patients assigned to the caller.
pub async fn assigned<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
) -> Result<Json<Vec<Patient>>, ApiError>
where
  S: CareStore,
{
  let list = store.therapist_patients(caller.id).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

/// `GET /family/patients`: patients the caller is linked to.
pub async fn linked<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
) -> Result<Json<Vec<FamilyPatient>>, ApiError>
where
  S: CareStore,
{
  let list = store.family_patients(caller.id).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

/// `GET /family/patients/{id}/activities`: 404 unless the caller is linked
/// to the patient.
pub async fn linked_activities<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Activity>>, ApiError>
where
  S: CareStore,
{
  let links = store.family_patients(caller.id).await.map_err(ApiError::store)?;
  if !links.iter().any(|l| l.patient.id == id) {
    return Err(ApiError::NotFound(format!("patient {id} not found")));
  }
  let query = ActivityQuery {
    patient_id: Some(id),
    scheduled_from: Some(Utc::now()),
    ..Default::default()
  };
  let list = store.list_activities(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

//! Handlers for `/progress` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/progress` | Staff: optional `patient_id`, `limit`; newest session first |
//! | `GET`  | `/progress` | Therapist: notes authored by the caller |
//! | `POST` | `/progress` | Body: [`ProgressForm`]; the caller is the author |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rehab_core::{
  profile::Profile,
  record::PatientProgress,
  store::{CareStore, ProgressQuery},
  validate::ProgressForm,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub patient_id: Option<Uuid>,
  pub limit:      Option<usize>,
}

/// `GET /progress[?patient_id=...][&limit=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PatientProgress>>, ApiError>
where
  S: CareStore,
{
  let query = ProgressQuery {
    patient_id:   params.patient_id,
    therapist_id: None,
    limit:        params.limit,
  };
  let list = store.list_progress(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

/// `GET /progress/mine[?patient_id=...][&limit=...]`
pub async fn mine<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PatientProgress>>, ApiError>
where
  S: CareStore,
{
  let query = ProgressQuery {
    patient_id:   params.patient_id,
    therapist_id: Some(caller.id),
    limit:        params.limit,
  };
  let list = store.list_progress(&query).await.map_err(ApiError::store)?;
  Ok(Json(list))
}

/// `POST /progress`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
  Json(form): Json<ProgressForm>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
{
  let input = form.validate(caller.id)?;
  let note = store.record_progress(input).await.map_err(ApiError::store)?;
  tracing::info!(note = %note.id, patient = %note.patient_id, "progress recorded");
  Ok((StatusCode::CREATED, Json(note)))
}

//! Handlers linking patients to therapists and family members.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/patients/{id}/therapists` | Body: `{"therapist_id":"..."}` |
//! | `POST` | `/patients/{id}/family` | Body: `{"family_member_id":"...","relationship":"..."}` |
//!
//! The linked profile must hold the matching role.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rehab_core::{Role, store::CareStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Fails unless `id` names a profile holding `role`.
async fn require_role<S: CareStore>(store: &S, id: Uuid, role: Role) -> Result<(), ApiError> {
  let profile = store
    .get_profile(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {id} not found")))?;
  if profile.role() == Some(role) {
    Ok(())
  } else {
    Err(ApiError::BadRequest(format!("profile {id} is not a {role}")))
  }
}

#[derive(Debug, Deserialize)]
pub struct TherapistBody {
  pub therapist_id: Uuid,
}

/// `POST /patients/{id}/therapists`
pub async fn assign_therapist<S>(
  State(store): State<Arc<S>>,
  Path(patient_id): Path<Uuid>,
  Json(body): Json<TherapistBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
{
  require_role(store.as_ref(), body.therapist_id, Role::Therapist).await?;
  let link = store
    .assign_therapist(patient_id, body.therapist_id)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(link)))
}

#[derive(Debug, Deserialize)]
pub struct FamilyBody {
  pub family_member_id: Uuid,
  pub relationship:     String,
}

/// `POST /patients/{id}/family`
pub async fn link_family<S>(
  State(store): State<Arc<S>>,
  Path(patient_id): Path<Uuid>,
  Json(body): Json<FamilyBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CareStore,
{
  let relationship = body.relationship.trim().to_owned();
  if relationship.is_empty() {
    return Err(ApiError::BadRequest("relationship is required".into()));
  }
  require_role(store.as_ref(), body.family_member_id, Role::Family).await?;
  let link = store
    .link_family(patient_id, body.family_member_id, relationship)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(link)))
}

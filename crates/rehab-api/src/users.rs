//! Handlers for `/users` endpoints: profiles and role assignment.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users` | Optional `?role=admin\|therapist\|staff\|family` |
//! | `PUT`  | `/users/{id}/role` | Body: `{"role":"therapist"}` or `{"role":null}` |

use std::sync::Arc;

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use rehab_core::{Role, profile::Profile, store::CareStore};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub role: Option<Role>,
}

/// `GET /users[?role=<role>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Profile>>, ApiError>
where
  S: CareStore,
{
  let profiles = store.list_profiles(params.role).await.map_err(ApiError::store)?;
  Ok(Json(profiles))
}

#[derive(Debug, Deserialize)]
pub struct RoleBody {
  pub role: Option<Role>,
}

/// `PUT /users/{id}/role`
///
/// Callers cannot change their own role.
pub async fn set_role<S>(
  State(store): State<Arc<S>>,
  Extension(caller): Extension<Profile>,
  Path(id): Path<Uuid>,
  Json(body): Json<RoleBody>,
) -> Result<Json<Profile>, ApiError>
where
  S: CareStore,
{
  if id == caller.id && body.role != caller.role() {
    return Err(ApiError::BadRequest("cannot change your own role".into()));
  }
  let profile = store
    .set_role(id, body.role)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {id} not found")))?;
  tracing::info!(profile = %id, role = ?body.role, by = %caller.id, "role assigned");
  Ok(Json(profile))
}

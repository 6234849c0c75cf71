//! Who is calling: access-token extraction and the [`Identity`] extractor.
//!
//! The token is read from `Authorization: Bearer <token>` first, then from
//! the `rehab_session` cookie.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use rehab_core::{
  Role,
  profile::Profile,
  session::User,
  store::{AuthService, CareStore},
};

use crate::{AppState, error::Error};

pub const SESSION_COOKIE: &str = "rehab_session";

/// The access token presented with a request, if any.
pub fn access_token(headers: &HeaderMap) -> Option<&str> {
  let bearer = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty());

  bearer.or_else(|| {
    headers
      .get_all(header::COOKIE)
      .iter()
      .filter_map(|v| v.to_str().ok())
      .flat_map(|v| v.split(';'))
      .filter_map(|pair| pair.trim().split_once('='))
      .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
      .map(|(_, value)| value)
  })
}

/// The authenticated caller: the session's user and, when the row exists,
/// their profile.
#[derive(Debug, Clone)]
pub struct Identity {
  pub user:    User,
  pub profile: Option<Profile>,
  pub token:   String,
}

impl Identity {
  /// The recognised role, if any.
  pub fn role(&self) -> Option<Role> { self.profile.as_ref().and_then(Profile::role) }
}

/// Resolve the request's token to an [`Identity`].
///
/// `Ok(None)` for no token or a dead one. A failed profile read leaves
/// `profile = None` rather than failing the request.
pub async fn resolve<A, S>(state: &AppState<A, S>, headers: &HeaderMap) -> Result<Option<Identity>, Error>
where
  A: AuthService,
  S: CareStore,
{
  let Some(token) = access_token(headers) else {
    return Ok(None);
  };
  let Some(user) = state.auth.get_user(token).await.map_err(Error::store)? else {
    return Ok(None);
  };

  let profile = match state.store.get_profile(user.id).await {
    Ok(p) => p,
    Err(e) => {
      tracing::warn!(user = %user.id, error = %e, "profile read failed");
      None
    }
  };

  Ok(Some(Identity { user, profile, token: token.to_owned() }))
}

impl<A, S> FromRequestParts<AppState<A, S>> for Identity
where
  A: AuthService + 'static,
  S: CareStore + 'static,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<A, S>,
  ) -> Result<Self, Self::Rejection> {
    // Already resolved by the route guard.
    if let Some(identity) = parts.extensions.get::<Identity>() {
      return Ok(identity.clone());
    }
    resolve(state, &parts.headers).await?.ok_or(Error::Unauthorized)
  }
}

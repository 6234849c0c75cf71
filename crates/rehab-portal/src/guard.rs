//! Route-guard middleware.
//!
//! Wraps the whole router. Classifies the request path with
//! [`route_scope`], resolves the caller only where the guard applies, and
//! either redirects (`303 See Other`) or passes the request on with the
//! caller's [`Identity`] and [`Profile`](rehab_core::profile::Profile) in its
//! extensions.

use axum::{
  extract::{Request, State},
  middleware::Next,
  response::{IntoResponse, Redirect, Response},
};
use rehab_core::{
  access::{RouteScope, decide, route_scope},
  store::{AuthService, CareStore},
};

use crate::{AppState, error::Error, identity::{self, Identity}};

pub async fn guard<A, S>(
  State(state): State<AppState<A, S>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error>
where
  A: AuthService + 'static,
  S: CareStore + 'static,
{
  let path = req.uri().path().to_owned();
  let allowed = match route_scope(&path) {
    RouteScope::Public | RouteScope::NotFound => return Ok(next.run(req).await),
    scope => scope.allowed(),
  };

  let identity = identity::resolve(&state, req.headers()).await?;
  let role = identity.as_ref().and_then(Identity::role);
  let requested = req
    .uri()
    .path_and_query()
    .map_or(path.clone(), |pq| pq.as_str().to_owned());

  let decision = decide(identity.is_some(), role, allowed, &requested);
  if let Some(location) = decision.location() {
    tracing::debug!(path = %requested, ?role, %location, "guard redirect");
    return Ok(Redirect::to(&location).into_response());
  }

  if let Some(identity) = identity {
    if let Some(profile) = identity.profile.clone() {
      req.extensions_mut().insert(profile);
    }
    req.extensions_mut().insert(identity);
  }
  Ok(next.run(req).await)
}

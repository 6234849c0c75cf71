//! Route-based access control.
//!
//! [`decide`] is the single decision point wrapping every role-scoped route
//! subtree; [`role_home`] is the single role-to-route mapping. Both the
//! portal server and the client navigate through these two functions.
//!
//! The root route never redirects a user without a recognised role: it
//! renders a static "no role assigned" view, so a guard redirect to `/` can
//! never bounce back.

use serde::Serialize;

use crate::role::Role;

pub const LOGIN_PATH: &str = "/auth";
pub const ROOT_PATH: &str = "/";

// ─── Decision ────────────────────────────────────────────────────────────────

/// What to do with a navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
  Render,
  /// No session: go to the login view, remembering where the user was headed.
  RedirectToLogin { from: String },
  /// Session present but the role may not enter this subtree.
  RedirectToRoleHome { to: &'static str },
}

impl Decision {
  /// The redirect target, or `None` for [`Decision::Render`].
  pub fn location(&self) -> Option<String> {
    match self {
      Self::Render => None,
      Self::RedirectToLogin { from } => Some(login_location(from)),
      Self::RedirectToRoleHome { to } => Some((*to).to_owned()),
    }
  }
}

/// Decide whether to render `requested` or redirect.
///
/// `allowed = None` means any authenticated role (including none at all) may
/// enter. A missing or unrecognised role is passed as `role = None`.
pub fn decide(
  has_session: bool,
  role: Option<Role>,
  allowed: Option<&[Role]>,
  requested: &str,
) -> Decision {
  if !has_session {
    return Decision::RedirectToLogin { from: requested.to_owned() };
  }
  match (allowed, role) {
    (Some(allowed), Some(r)) if allowed.contains(&r) => Decision::Render,
    (Some(_), role) => Decision::RedirectToRoleHome { to: role_home(role) },
    (None, _) => Decision::Render,
  }
}

/// The home route for a role. Total: no role maps to the root.
pub fn role_home(role: Option<Role>) -> &'static str {
  match role {
    Some(Role::Admin) => "/admin",
    Some(Role::Therapist) => "/therapist",
    Some(Role::Staff) => "/staff",
    Some(Role::Family) => "/family",
    None => ROOT_PATH,
  }
}

/// `/auth?from=<requested>` with the requested location percent-encoded.
pub fn login_location(from: &str) -> String {
  format!("{LOGIN_PATH}?from={}", urlencoding::encode(from))
}

// ─── Route table ─────────────────────────────────────────────────────────────

/// Access scope of a path in the portal's route tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
  /// Reachable without a session (the login view).
  Public,
  /// Any session, whatever the role.
  Authenticated,
  /// Only the listed roles.
  Restricted(&'static [Role]),
  /// Wildcard not-found.
  NotFound,
}

impl RouteScope {
  /// The allowed-role set handed to [`decide`], or `None` if the guard does
  /// not apply.
  pub fn allowed(self) -> Option<&'static [Role]> {
    match self {
      Self::Restricted(roles) => Some(roles),
      _ => None,
    }
  }
}

const ROLE_PREFIXES: [(&str, Role); 4] = [
  ("/admin", Role::Admin),
  ("/therapist", Role::Therapist),
  ("/staff", Role::Staff),
  ("/family", Role::Family),
];

/// Classify `path` (query string and fragment are ignored).
pub fn route_scope(path: &str) -> RouteScope {
  let path = path.split(['?', '#']).next().unwrap_or_default();

  if path.is_empty() || path == ROOT_PATH {
    return RouteScope::Authenticated;
  }
  if under(path, LOGIN_PATH) {
    return RouteScope::Public;
  }
  ROLE_PREFIXES
    .iter()
    .find(|(prefix, _)| under(path, prefix))
    .map_or(RouteScope::NotFound, |(_, role)| RouteScope::Restricted(role.only()))
}

/// `true` if `path` is `prefix` itself or lies beneath it.
fn under(path: &str, prefix: &str) -> bool {
  path
    .strip_prefix(prefix)
    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Run the guard for a navigation to `path`.
///
/// Returns `None` for public and not-found paths, where the guard does not
/// apply.
pub fn guard(has_session: bool, role: Option<Role>, path: &str) -> Option<Decision> {
  match route_scope(path) {
    RouteScope::Public | RouteScope::NotFound => None,
    scope => Some(decide(has_session, role, scope.allowed(), path)),
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;
  use crate::role::RoleAssignment;

  fn role_options() -> Vec<Option<Role>> {
    std::iter::once(None).chain(Role::iter().map(Some)).collect()
  }

  fn allowed_options() -> Vec<Option<&'static [Role]>> {
    let mut v: Vec<Option<&'static [Role]>> = vec![None];
    v.extend(Role::iter().map(|r| Some(r.only())));
    v.push(Some(&[Role::Admin, Role::Staff]));
    v
  }

  #[test]
  fn without_session_always_login() {
    for role in role_options() {
      for allowed in allowed_options() {
        assert_eq!(
          decide(false, role, allowed, "/x"),
          Decision::RedirectToLogin { from: "/x".into() }
        );
      }
    }
  }

  #[test]
  fn unrestricted_always_renders_with_session() {
    for role in role_options() {
      assert_eq!(decide(true, role, None, "/"), Decision::Render);
    }
  }

  #[test]
  fn staff_on_admin_route_goes_to_staff_home() {
    let d = decide(true, Some(Role::Staff), Some(&[Role::Admin]), "/admin");
    assert_eq!(d, Decision::RedirectToRoleHome { to: "/staff" });
  }

  #[test]
  fn missing_role_on_restricted_route_goes_to_root() {
    let d = decide(true, None, Some(&[Role::Admin]), "/admin");
    assert_eq!(d, Decision::RedirectToRoleHome { to: "/" });
  }

  #[test]
  fn unknown_role_maps_to_root() {
    let unknown = RoleAssignment::from(Some("unknown".to_string()));
    assert_eq!(role_home(unknown.role()), "/");
    assert_eq!(role_home(None), "/");
  }

  #[test]
  fn family_navigating_into_admin_lands_on_family() {
    let d = guard(true, Some(Role::Family), "/admin/anything").unwrap();
    assert_eq!(d, Decision::RedirectToRoleHome { to: "/family" });
    assert_eq!(d.location().as_deref(), Some("/family"));
  }

  #[test]
  fn anonymous_staff_keeps_requested_location() {
    let d = guard(false, None, "/staff").unwrap();
    assert_eq!(d, Decision::RedirectToLogin { from: "/staff".into() });
    assert_eq!(d.location().as_deref(), Some("/auth?from=%2Fstaff"));
  }

  #[test]
  fn route_table() {
    assert_eq!(route_scope("/"), RouteScope::Authenticated);
    assert_eq!(route_scope("/auth"), RouteScope::Public);
    assert_eq!(route_scope("/auth?from=%2F"), RouteScope::Public);
    assert_eq!(route_scope("/staff/patients/new"), RouteScope::Restricted(&[Role::Staff]));
    assert_eq!(route_scope("/admin"), RouteScope::Restricted(&[Role::Admin]));
    assert_eq!(route_scope("/administrator"), RouteScope::NotFound);
    assert_eq!(route_scope("/treatments"), RouteScope::NotFound);
  }

  #[test]
  fn role_home_is_allowed_for_its_role() {
    for role in Role::iter() {
      let home = role_home(Some(role));
      assert_eq!(guard(true, Some(role), home), Some(Decision::Render));
    }
  }

  #[test]
  fn root_never_redirects_roleless_user() {
    assert_eq!(guard(true, None, "/"), Some(Decision::Render));
  }
}

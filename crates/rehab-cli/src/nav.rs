//! Client-side navigation through the route guard.

use rehab_core::{
  Role,
  access::{Decision, ROOT_PATH, RouteScope, guard, role_home, route_scope},
};

/// Upper bound on redirect hops. The route table resolves in at most two.
const MAX_HOPS: usize = 4;

/// Where a navigation to `path` ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
  /// Render this path.
  Page(String),
  /// Sign in first; `from` is where to return afterwards.
  Login { from: String },
  /// Not part of the route table.
  NotFound(String),
}

/// Follow guard redirects from `path` until something renders.
///
/// The root path sends a recognised role on to its home and otherwise
/// renders the "no role assigned" view.
pub fn resolve(has_session: bool, role: Option<Role>, path: &str) -> Destination {
  let mut path = path.to_owned();
  for _ in 0..MAX_HOPS {
    match guard(has_session, role, &path) {
      None if route_scope(&path) == RouteScope::Public => return Destination::Page(path),
      None => return Destination::NotFound(path),
      Some(Decision::RedirectToLogin { from }) => return Destination::Login { from },
      Some(Decision::RedirectToRoleHome { to }) => path = to.to_owned(),
      Some(Decision::Render) if path == ROOT_PATH && role.is_some() => {
        path = role_home(role).to_owned();
      }
      Some(Decision::Render) => return Destination::Page(path),
    }
  }
  tracing::warn!(%path, "navigation did not settle");
  Destination::Page(ROOT_PATH.to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn anonymous_goes_to_login_with_from() {
    assert_eq!(
      resolve(false, None, "/staff"),
      Destination::Login { from: "/staff".into() }
    );
  }

  #[test]
  fn family_on_admin_lands_on_family_home() {
    assert_eq!(
      resolve(true, Some(Role::Family), "/admin/anything"),
      Destination::Page("/family".into())
    );
  }

  #[test]
  fn root_forwards_a_role_and_stops_without_one() {
    assert_eq!(resolve(true, Some(Role::Therapist), "/"), Destination::Page("/therapist".into()));
    assert_eq!(resolve(true, None, "/"), Destination::Page("/".into()));
    assert_eq!(resolve(true, None, "/admin"), Destination::Page("/".into()));
  }

  #[test]
  fn own_subtree_renders() {
    assert_eq!(
      resolve(true, Some(Role::Staff), "/staff/patients"),
      Destination::Page("/staff/patients".into())
    );
  }

  #[test]
  fn login_and_unknown_paths() {
    assert_eq!(resolve(false, None, "/auth"), Destination::Page("/auth".into()));
    assert_eq!(resolve(true, None, "/treatments"), Destination::NotFound("/treatments".into()));
  }
}

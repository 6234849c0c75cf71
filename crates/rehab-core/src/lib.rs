//! Core types and trait definitions for the RehabCare portal.
//!
//! No HTTP or database dependencies; the store, API, portal and client
//! crates all build on it.

pub mod access;
pub mod error;
pub mod notice;
pub mod profile;
pub mod record;
pub mod role;
pub mod session;
pub mod store;
pub mod validate;

pub use error::{AuthFailure, CoreErrorSource, Error, Result};
pub use role::{Role, RoleAssignment};

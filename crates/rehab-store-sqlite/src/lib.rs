//! SQLite backend for the RehabCare portal.
//!
//! Implements both collaborator traits, [`rehab_core::store::AuthService`]
//! and [`rehab_core::store::CareStore`], over one database file. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod auth;
mod encode;
mod schema;
mod store;
mod token;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

//! The collaborator traits: [`AuthService`] for identities and sessions, and
//! [`CareStore`] for profiles and care records.
//!
//! Both are implemented by storage backends (e.g. `rehab-store-sqlite`).
//! The portal depends on these abstractions, not on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  error::CoreErrorSource,
  profile::Profile,
  record::{
    Activity, FamilyPatient, NewActivity, NewPatient, NewProgress, Patient,
    PatientFamily, PatientProgress, PatientStatus, PatientTherapist,
  },
  role::Role,
  session::{NewAccount, Session, SignUpOutcome, User},
};

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
  #[default]
  Ascending,
  Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatientOrder {
  #[default]
  LastName,
  FirstName,
}

/// Parameters for [`CareStore::list_patients`].
#[derive(Debug, Clone, Default)]
pub struct PatientQuery {
  pub status: Option<PatientStatus>,
  /// Case-insensitive substring over first and last name.
  pub name:   Option<String>,
  pub order:  PatientOrder,
  pub limit:  Option<usize>,
}

/// Parameters for [`CareStore::list_activities`], ordered by
/// `scheduled_date`.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
  pub patient_id:       Option<Uuid>,
  /// Inclusive lower bound on `scheduled_date`.
  pub scheduled_from:   Option<DateTime<Utc>>,
  /// Exclusive upper bound on `scheduled_date`.
  pub scheduled_before: Option<DateTime<Utc>>,
  /// Only activities without `completed_at`.
  pub pending_only:     bool,
  pub direction:        SortDirection,
  pub limit:            Option<usize>,
}

/// Parameters for [`CareStore::list_progress`], newest session first.
#[derive(Debug, Clone, Default)]
pub struct ProgressQuery {
  pub patient_id:   Option<Uuid>,
  pub therapist_id: Option<Uuid>,
  pub limit:        Option<usize>,
}

// ─── Auth service ────────────────────────────────────────────────────────────

/// The authentication collaborator: owns identities and session lifecycles.
///
/// Refusals (bad credentials, duplicate email, ...) come back as errors whose
/// [`CoreErrorSource::auth_failure`] is set.
pub trait AuthService: Send + Sync {
  type Error: CoreErrorSource + std::error::Error + Send + Sync + 'static;

  /// Create a user and its profile row. The session is `None` when the
  /// address must be confirmed first.
  fn sign_up(
    &self,
    account: NewAccount,
  ) -> impl Future<Output = Result<SignUpOutcome, Self::Error>> + Send + '_;

  fn sign_in_with_password<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'a;

  /// Mark the address behind a confirmation token as confirmed.
  fn confirm_email<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + 'a;

  /// Resolve an access token to its user. Unknown, revoked and expired
  /// tokens all yield `None`.
  fn get_user<'a>(
    &'a self,
    access_token: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Exchange a refresh token for a fresh session; the old one is revoked.
  fn refresh_session<'a>(
    &'a self,
    refresh_token: &'a str,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'a;

  /// Revoke a session. Revoking an unknown token is not an error.
  fn sign_out<'a>(
    &'a self,
    access_token: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn find_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;
}

// ─── Care store ──────────────────────────────────────────────────────────────

/// The data collaborator: profiles and care records.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CareStore: Send + Sync {
  type Error: CoreErrorSource + std::error::Error + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// List profiles, optionally only those holding `role`.
  fn list_profiles(
    &self,
    role: Option<Role>,
  ) -> impl Future<Output = Result<Vec<Profile>, Self::Error>> + Send + '_;

  /// Replace a profile's role. Returns `None` if the profile does not exist.
  fn set_role(
    &self,
    id: Uuid,
    role: Option<Role>,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  // ── Patients ──────────────────────────────────────────────────────────

  fn add_patient(
    &self,
    input: NewPatient,
  ) -> impl Future<Output = Result<Patient, Self::Error>> + Send + '_;

  fn get_patient(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + '_;

  fn list_patients<'a>(
    &'a self,
    query: &'a PatientQuery,
  ) -> impl Future<Output = Result<Vec<Patient>, Self::Error>> + Send + 'a;

  // ── Activities ────────────────────────────────────────────────────────

  /// Returns an error if the patient does not exist.
  fn schedule_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  fn list_activities<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + 'a;

  /// Mark an activity completed by `by`. An activity completes at most once.
  fn complete_activity(
    &self,
    id: Uuid,
    by: Uuid,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  // ── Progress notes ────────────────────────────────────────────────────

  fn record_progress(
    &self,
    input: NewProgress,
  ) -> impl Future<Output = Result<PatientProgress, Self::Error>> + Send + '_;

  fn list_progress<'a>(
    &'a self,
    query: &'a ProgressQuery,
  ) -> impl Future<Output = Result<Vec<PatientProgress>, Self::Error>> + Send + 'a;

  // ── Links ─────────────────────────────────────────────────────────────

  fn assign_therapist(
    &self,
    patient_id: Uuid,
    therapist_id: Uuid,
  ) -> impl Future<Output = Result<PatientTherapist, Self::Error>> + Send + '_;

  /// Patients assigned to `therapist_id`, by last name.
  fn therapist_patients(
    &self,
    therapist_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Patient>, Self::Error>> + Send + '_;

  fn link_family(
    &self,
    patient_id: Uuid,
    family_member_id: Uuid,
    relationship: String,
  ) -> impl Future<Output = Result<PatientFamily, Self::Error>> + Send + '_;

  /// Family links of `family_member_id` with the patient rows expanded.
  fn family_patients(
    &self,
    family_member_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FamilyPatient>, Self::Error>> + Send + '_;
}

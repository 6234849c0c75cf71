//! [`SqliteStore`]: the SQLite implementation of [`CareStore`].
//!
//! The [`AuthService`](rehab_core::store::AuthService) half lives in
//! `auth.rs`; both share one connection.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rehab_core::{
  profile::Profile,
  record::{
    Activity, FamilyPatient, NewActivity, NewPatient, NewProgress, Patient, PatientFamily,
    PatientProgress, PatientTherapist,
  },
  role::Role,
  session::AuthPolicy,
  store::{ActivityQuery, CareStore, PatientOrder, PatientQuery, ProgressQuery, SortDirection},
};

use crate::{
  encode::{
    ACTIVITY_COLUMNS, PATIENT_COLUMNS, PROFILE_COLUMNS, PROGRESS_COLUMNS, RawActivity,
    RawFamilyLink, RawPatient, RawProfile, RawProgress, RawTherapistLink, encode_date,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

/// SQLite reads a negative LIMIT as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
  limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A RehabCare store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) policy: AuthPolicy,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, policy: AuthPolicy::default() })
  }

  /// Replace the session lifetime and confirmation rules.
  pub fn with_auth_policy(mut self, policy: AuthPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn auth_policy(&self) -> AuthPolicy { self.policy }

  /// `true` if a row with primary key `id` exists in `table`.
  async fn exists(&self, table: &'static str, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT 1 FROM {table} WHERE id = ?1"),
              rusqlite::params![id_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(found)
  }

  async fn require_patient(&self, id: Uuid) -> Result<()> {
    if self.exists("patients", id).await? {
      Ok(())
    } else {
      Err(rehab_core::Error::PatientNotFound(id).into())
    }
  }

  async fn require_profile(&self, id: Uuid) -> Result<()> {
    if self.exists("profiles", id).await? {
      Ok(())
    } else {
      Err(rehab_core::Error::ProfileNotFound(id).into())
    }
  }

  async fn get_activity(&self, id: Uuid) -> Result<Option<Activity>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawActivity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
              rusqlite::params![id_str],
              RawActivity::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawActivity::into_activity).transpose()
  }
}

/// What happened to a completion attempt inside the connection thread.
enum Completion {
  Missing,
  AlreadyDone,
  Done,
}

// ─── CareStore impl ──────────────────────────────────────────────────────────

impl CareStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn list_profiles(&self, role: Option<Role>) -> Result<Vec<Profile>> {
    let role_str = role.map(|r| r.as_ref().to_owned());

    let raws: Vec<RawProfile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROFILE_COLUMNS} FROM profiles
           WHERE (?1 IS NULL OR role = ?1)
           ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![role_str], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }

  async fn set_role(&self, id: Uuid, role: Option<Role>) -> Result<Option<Profile>> {
    let id_str   = encode_uuid(id);
    let role_str = role.map(|r| r.as_ref().to_owned());
    let now_str  = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE profiles SET role = ?2, updated_at = ?3 WHERE id = ?1",
          rusqlite::params![id_str, role_str, now_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.get_profile(id).await
  }

  // ── Patients ──────────────────────────────────────────────────────────────

  async fn add_patient(&self, input: NewPatient) -> Result<Patient> {
    let now = Utc::now();
    let patient = Patient {
      id:                      Uuid::new_v4(),
      first_name:              input.first_name,
      last_name:               input.last_name,
      date_of_birth:           input.date_of_birth,
      admission_date:          input.admission_date,
      expected_discharge_date: input.expected_discharge_date,
      medical_history:         input.medical_history,
      status:                  Some(input.status),
      created_at:              now,
      updated_at:              now,
    };

    let id_str        = encode_uuid(patient.id);
    let first         = patient.first_name.clone();
    let last          = patient.last_name.clone();
    let dob_str       = encode_date(patient.date_of_birth);
    let admitted_str  = encode_date(patient.admission_date);
    let discharge_str = patient.expected_discharge_date.map(encode_date);
    let history       = patient.medical_history.clone();
    let status_str    = input.status.as_ref().to_owned();
    let now_str       = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patients (
             id, first_name, last_name, date_of_birth, admission_date,
             expected_discharge_date, medical_history, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          rusqlite::params![
            id_str,
            first,
            last,
            dob_str,
            admitted_str,
            discharge_str,
            history,
            status_str,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(patient)
  }

  async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPatient> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
              rusqlite::params![id_str],
              RawPatient::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPatient::into_patient).transpose()
  }

  async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<Patient>> {
    let status_str = query.status.map(|s| s.as_ref().to_owned());
    let order = match query.order {
      PatientOrder::LastName => "last_name COLLATE NOCASE, first_name COLLATE NOCASE",
      PatientOrder::FirstName => "first_name COLLATE NOCASE, last_name COLLATE NOCASE",
    };
    // The name filter runs in Rust (Unicode-aware), so LIMIT can only be
    // pushed into SQL when there is no name filter.
    let name = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let sql_lim = if name.is_some() { -1 } else { sql_limit(query.limit) };

    let raws: Vec<RawPatient> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PATIENT_COLUMNS} FROM patients
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY {order}
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str, sql_lim], RawPatient::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut patients = raws
      .into_iter()
      .map(RawPatient::into_patient)
      .collect::<Result<Vec<_>>>()?;

    if let Some(needle) = name {
      patients.retain(|p| p.name_matches(needle));
      if let Some(n) = query.limit {
        patients.truncate(n);
      }
    }
    Ok(patients)
  }

  // ── Activities ────────────────────────────────────────────────────────────

  async fn schedule_activity(&self, input: NewActivity) -> Result<Activity> {
    self.require_patient(input.patient_id).await?;

    let now = Utc::now();
    let activity = Activity {
      id:             Uuid::new_v4(),
      patient_id:     input.patient_id,
      name:           input.name,
      description:    input.description,
      scheduled_date: input.scheduled_date,
      completed_at:   None,
      completed_by:   None,
      created_at:     now,
      updated_at:     now,
    };

    let id_str        = encode_uuid(activity.id);
    let patient_str   = encode_uuid(activity.patient_id);
    let name          = activity.name.clone();
    let description   = activity.description.clone();
    let scheduled_str = encode_dt(activity.scheduled_date);
    let now_str       = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO activities (
             id, patient_id, name, description, scheduled_date, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          rusqlite::params![id_str, patient_str, name, description, scheduled_str, now_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(activity)
  }

  async fn list_activities(&self, query: &ActivityQuery) -> Result<Vec<Activity>> {
    let patient_str = query.patient_id.map(encode_uuid);
    let from_str    = query.scheduled_from.map(encode_dt);
    let before_str  = query.scheduled_before.map(encode_dt);
    let pending     = query.pending_only;
    let limit       = sql_limit(query.limit);
    let direction   = match query.direction {
      SortDirection::Ascending => "ASC",
      SortDirection::Descending => "DESC",
    };

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM activities
           WHERE (?1 IS NULL OR patient_id = ?1)
             AND (?2 IS NULL OR scheduled_date >= ?2)
             AND (?3 IS NULL OR scheduled_date < ?3)
             AND (?4 = 0 OR completed_at IS NULL)
           ORDER BY scheduled_date {direction}
           LIMIT ?5"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![patient_str, from_str, before_str, pending, limit],
            RawActivity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn complete_activity(&self, id: Uuid, by: Uuid) -> Result<Activity> {
    self.require_profile(by).await?;

    let id_str  = encode_uuid(id);
    let by_str  = encode_uuid(by);
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let completed: Option<Option<String>> = tx
          .query_row(
            "SELECT completed_at FROM activities WHERE id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let outcome = match completed {
          None => Completion::Missing,
          Some(Some(_)) => Completion::AlreadyDone,
          Some(None) => {
            tx.execute(
              "UPDATE activities SET completed_at = ?2, completed_by = ?3, updated_at = ?2
               WHERE id = ?1 AND completed_at IS NULL",
              rusqlite::params![id_str, now_str, by_str],
            )?;
            Completion::Done
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match outcome {
      Completion::Missing => Err(rehab_core::Error::ActivityNotFound(id).into()),
      Completion::AlreadyDone => Err(rehab_core::Error::AlreadyCompleted(id).into()),
      Completion::Done => self
        .get_activity(id)
        .await?
        .ok_or_else(|| rehab_core::Error::ActivityNotFound(id).into()),
    }
  }

  // ── Progress notes ────────────────────────────────────────────────────────

  async fn record_progress(&self, input: NewProgress) -> Result<PatientProgress> {
    self.require_patient(input.patient_id).await?;
    self.require_profile(input.therapist_id).await?;

    let now = Utc::now();
    let progress = PatientProgress {
      id:           Uuid::new_v4(),
      patient_id:   input.patient_id,
      therapist_id: input.therapist_id,
      notes:        input.notes,
      session_date: input.session_date,
      created_at:   now,
      updated_at:   now,
    };

    let id_str        = encode_uuid(progress.id);
    let patient_str   = encode_uuid(progress.patient_id);
    let therapist_str = encode_uuid(progress.therapist_id);
    let notes         = progress.notes.clone();
    let session_str   = encode_date(progress.session_date);
    let now_str       = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patient_progress (
             id, patient_id, therapist_id, notes, session_date, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          rusqlite::params![id_str, patient_str, therapist_str, notes, session_str, now_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(progress)
  }

  async fn list_progress(&self, query: &ProgressQuery) -> Result<Vec<PatientProgress>> {
    let patient_str   = query.patient_id.map(encode_uuid);
    let therapist_str = query.therapist_id.map(encode_uuid);
    let limit         = sql_limit(query.limit);

    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROGRESS_COLUMNS} FROM patient_progress
           WHERE (?1 IS NULL OR patient_id = ?1)
             AND (?2 IS NULL OR therapist_id = ?2)
           ORDER BY session_date DESC, created_at DESC
           LIMIT ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![patient_str, therapist_str, limit],
            RawProgress::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgress::into_progress).collect()
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  async fn assign_therapist(&self, patient_id: Uuid, therapist_id: Uuid) -> Result<PatientTherapist> {
    self.require_patient(patient_id).await?;
    self.require_profile(therapist_id).await?;

    let id_str        = encode_uuid(Uuid::new_v4());
    let patient_str   = encode_uuid(patient_id);
    let therapist_str = encode_uuid(therapist_id);
    let now_str       = encode_dt(Utc::now());

    // Assigning twice is a no-op that returns the existing link.
    let raw: RawTherapistLink = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patient_therapists (id, patient_id, therapist_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (patient_id, therapist_id) DO NOTHING",
          rusqlite::params![id_str, patient_str, therapist_str, now_str],
        )?;
        Ok(conn.query_row(
          "SELECT id, patient_id, therapist_id, created_at, updated_at
           FROM patient_therapists WHERE patient_id = ?1 AND therapist_id = ?2",
          rusqlite::params![patient_str, therapist_str],
          RawTherapistLink::from_row,
        )?)
      })
      .await?;

    raw.into_link()
  }

  async fn therapist_patients(&self, therapist_id: Uuid) -> Result<Vec<Patient>> {
    let therapist_str = encode_uuid(therapist_id);

    let raws: Vec<RawPatient> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT p.id, p.first_name, p.last_name, p.date_of_birth, p.admission_date,
                  p.expected_discharge_date, p.medical_history, p.status,
                  p.created_at, p.updated_at
           FROM patient_therapists t
           JOIN patients p ON p.id = t.patient_id
           WHERE t.therapist_id = ?1
           ORDER BY p.last_name COLLATE NOCASE, p.first_name COLLATE NOCASE",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![therapist_str], RawPatient::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPatient::into_patient).collect()
  }

  async fn link_family(
    &self,
    patient_id:       Uuid,
    family_member_id: Uuid,
    relationship:     String,
  ) -> Result<PatientFamily> {
    self.require_patient(patient_id).await?;
    self.require_profile(family_member_id).await?;

    let id_str      = encode_uuid(Uuid::new_v4());
    let patient_str = encode_uuid(patient_id);
    let member_str  = encode_uuid(family_member_id);
    let now_str     = encode_dt(Utc::now());

    // Re-linking the same pair updates the relationship in place.
    let raw: RawFamilyLink = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patient_family (
             id, patient_id, family_member_id, relationship, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
           ON CONFLICT (patient_id, family_member_id) DO UPDATE
             SET relationship = excluded.relationship, updated_at = excluded.updated_at",
          rusqlite::params![id_str, patient_str, member_str, relationship, now_str],
        )?;
        Ok(conn.query_row(
          "SELECT id, patient_id, family_member_id, relationship, created_at, updated_at
           FROM patient_family WHERE patient_id = ?1 AND family_member_id = ?2",
          rusqlite::params![patient_str, member_str],
          RawFamilyLink::from_row,
        )?)
      })
      .await?;

    raw.into_link()
  }

  async fn family_patients(&self, family_member_id: Uuid) -> Result<Vec<FamilyPatient>> {
    let member_str = encode_uuid(family_member_id);

    let raws: Vec<(RawFamilyLink, RawPatient)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT f.id, f.patient_id, f.family_member_id, f.relationship,
                  f.created_at, f.updated_at,
                  p.id, p.first_name, p.last_name, p.date_of_birth, p.admission_date,
                  p.expected_discharge_date, p.medical_history, p.status,
                  p.created_at, p.updated_at
           FROM patient_family f
           JOIN patients p ON p.id = f.patient_id
           WHERE f.family_member_id = ?1
           ORDER BY p.last_name COLLATE NOCASE, p.first_name COLLATE NOCASE",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![member_str], |row| {
            Ok((RawFamilyLink::from_row(row)?, RawPatient::from_row_at(row, 6)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(link, patient)| {
        Ok(FamilyPatient { link: link.into_link()?, patient: patient.into_patient()? })
      })
      .collect()
  }
}

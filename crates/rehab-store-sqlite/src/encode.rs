//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 in UTC with microsecond precision, so
//! string comparison in SQL orders them chronologically. Calendar dates are
//! `YYYY-MM-DD`. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rehab_core::{
  profile::Profile,
  record::{
    Activity, Patient, PatientFamily, PatientProgress, PatientStatus, PatientTherapist,
  },
  role::RoleAssignment,
  session::User,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt<T>(s: Option<String>, f: impl Fn(&str) -> Result<T>) -> Result<Option<T>> {
  s.as_deref().map(f).transpose()
}

/// Unknown status text reads as "no status" rather than failing the row.
fn decode_status(s: Option<String>) -> Option<PatientStatus> {
  s.and_then(|s| s.parse().ok())
}

// ─── Row types ───────────────────────────────────────────────────────────────
//
// Each `Raw*` struct holds the column strings exactly as read inside the
// connection thread. Conversion to domain types happens back on the async
// side, where parse failures become `Error` values.

pub const USER_COLUMNS: &str = "id, email, email_confirmed_at, created_at";

pub struct RawUser {
  pub id:                 String,
  pub email:              String,
  pub email_confirmed_at: Option<String>,
  pub created_at:         String,
}

impl RawUser {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      email:              row.get(1)?,
      email_confirmed_at: row.get(2)?,
      created_at:         row.get(3)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      id:                 decode_uuid(&self.id)?,
      email:              self.email,
      email_confirmed_at: decode_opt(self.email_confirmed_at, decode_dt)?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

pub const PROFILE_COLUMNS: &str = "id, first_name, last_name, role, created_at, updated_at";

pub struct RawProfile {
  pub id:         String,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub role:       Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawProfile {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      first_name: row.get(1)?,
      last_name:  row.get(2)?,
      role:       row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
    })
  }

  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      id:         decode_uuid(&self.id)?,
      first_name: self.first_name,
      last_name:  self.last_name,
      role:       RoleAssignment::from(self.role),
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const PATIENT_COLUMNS: &str = "id, first_name, last_name, date_of_birth, \
  admission_date, expected_discharge_date, medical_history, status, created_at, updated_at";

pub struct RawPatient {
  pub id:                      String,
  pub first_name:              String,
  pub last_name:               String,
  pub date_of_birth:           String,
  pub admission_date:          String,
  pub expected_discharge_date: Option<String>,
  pub medical_history:         Option<String>,
  pub status:                  Option<String>,
  pub created_at:              String,
  pub updated_at:              String,
}

impl RawPatient {
  /// Read the patient columns starting at index `at`, so the same reader
  /// works for joined rows.
  pub fn from_row_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                      row.get(at)?,
      first_name:              row.get(at + 1)?,
      last_name:               row.get(at + 2)?,
      date_of_birth:           row.get(at + 3)?,
      admission_date:          row.get(at + 4)?,
      expected_discharge_date: row.get(at + 5)?,
      medical_history:         row.get(at + 6)?,
      status:                  row.get(at + 7)?,
      created_at:              row.get(at + 8)?,
      updated_at:              row.get(at + 9)?,
    })
  }

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> { Self::from_row_at(row, 0) }

  pub fn into_patient(self) -> Result<Patient> {
    Ok(Patient {
      id:                      decode_uuid(&self.id)?,
      first_name:              self.first_name,
      last_name:               self.last_name,
      date_of_birth:           decode_date(&self.date_of_birth)?,
      admission_date:          decode_date(&self.admission_date)?,
      expected_discharge_date: decode_opt(self.expected_discharge_date, decode_date)?,
      medical_history:         self.medical_history,
      status:                  decode_status(self.status),
      created_at:              decode_dt(&self.created_at)?,
      updated_at:              decode_dt(&self.updated_at)?,
    })
  }
}

pub const ACTIVITY_COLUMNS: &str = "id, patient_id, name, description, scheduled_date, \
  completed_at, completed_by, created_at, updated_at";

pub struct RawActivity {
  pub id:             String,
  pub patient_id:     String,
  pub name:           String,
  pub description:    Option<String>,
  pub scheduled_date: String,
  pub completed_at:   Option<String>,
  pub completed_by:   Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawActivity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      patient_id:     row.get(1)?,
      name:           row.get(2)?,
      description:    row.get(3)?,
      scheduled_date: row.get(4)?,
      completed_at:   row.get(5)?,
      completed_by:   row.get(6)?,
      created_at:     row.get(7)?,
      updated_at:     row.get(8)?,
    })
  }

  pub fn into_activity(self) -> Result<Activity> {
    Ok(Activity {
      id:             decode_uuid(&self.id)?,
      patient_id:     decode_uuid(&self.patient_id)?,
      name:           self.name,
      description:    self.description,
      scheduled_date: decode_dt(&self.scheduled_date)?,
      completed_at:   decode_opt(self.completed_at, decode_dt)?,
      completed_by:   decode_opt(self.completed_by, decode_uuid)?,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const PROGRESS_COLUMNS: &str =
  "id, patient_id, therapist_id, notes, session_date, created_at, updated_at";

pub struct RawProgress {
  pub id:           String,
  pub patient_id:   String,
  pub therapist_id: String,
  pub notes:        String,
  pub session_date: String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawProgress {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      patient_id:   row.get(1)?,
      therapist_id: row.get(2)?,
      notes:        row.get(3)?,
      session_date: row.get(4)?,
      created_at:   row.get(5)?,
      updated_at:   row.get(6)?,
    })
  }

  pub fn into_progress(self) -> Result<PatientProgress> {
    Ok(PatientProgress {
      id:           decode_uuid(&self.id)?,
      patient_id:   decode_uuid(&self.patient_id)?,
      therapist_id: decode_uuid(&self.therapist_id)?,
      notes:        self.notes,
      session_date: decode_date(&self.session_date)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawTherapistLink {
  pub id:           String,
  pub patient_id:   String,
  pub therapist_id: String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawTherapistLink {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      patient_id:   row.get(1)?,
      therapist_id: row.get(2)?,
      created_at:   row.get(3)?,
      updated_at:   row.get(4)?,
    })
  }

  pub fn into_link(self) -> Result<PatientTherapist> {
    Ok(PatientTherapist {
      id:           decode_uuid(&self.id)?,
      patient_id:   decode_uuid(&self.patient_id)?,
      therapist_id: decode_uuid(&self.therapist_id)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub const FAMILY_COLUMNS: &str =
  "id, patient_id, family_member_id, relationship, created_at, updated_at";

pub struct RawFamilyLink {
  pub id:               String,
  pub patient_id:       String,
  pub family_member_id: String,
  pub relationship:     String,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawFamilyLink {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      patient_id:       row.get(1)?,
      family_member_id: row.get(2)?,
      relationship:     row.get(3)?,
      created_at:       row.get(4)?,
      updated_at:       row.get(5)?,
    })
  }

  pub fn into_link(self) -> Result<PatientFamily> {
    Ok(PatientFamily {
      id:               decode_uuid(&self.id)?,
      patient_id:       decode_uuid(&self.patient_id)?,
      family_member_id: decode_uuid(&self.family_member_id)?,
      relationship:     self.relationship,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let a = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
    let b = a + chrono::TimeDelta::milliseconds(1500);
    let c = Utc.with_ymd_and_hms(2024, 11, 2, 9, 0, 0).unwrap();
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn dates_use_iso_calendar_form() {
    let d = NaiveDate::from_ymd_opt(1950, 3, 7).unwrap();
    assert_eq!(encode_date(d), "1950-03-07");
    assert_eq!(decode_date("1950-03-07").unwrap(), d);
    assert!(decode_date("07/03/1950").is_err());
  }

  #[test]
  fn unknown_status_reads_as_none() {
    assert_eq!(decode_status(Some("on_leave".into())), Some(PatientStatus::OnLeave));
    assert_eq!(decode_status(Some("archived".into())), None);
    assert_eq!(decode_status(None), None);
  }
}

//! Care records: patients, scheduled activities, progress notes and the
//! link tables tying patients to therapists and family members.
//!
//! These are plain rows with foreign keys. They have no lifecycle beyond
//! create and read, except that an activity can be marked completed once.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Patients ────────────────────────────────────────────────────────────────

/// Where a patient is in their stay.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatientStatus {
  #[default]
  Active,
  OnLeave,
  Discharged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
  pub id:                      Uuid,
  pub first_name:              String,
  pub last_name:               String,
  pub date_of_birth:           NaiveDate,
  pub admission_date:          NaiveDate,
  pub expected_discharge_date: Option<NaiveDate>,
  pub medical_history:         Option<String>,
  /// Nullable in storage; older rows may have no status at all.
  pub status:                  Option<PatientStatus>,
  pub created_at:              DateTime<Utc>,
  pub updated_at:              DateTime<Utc>,
}

impl Patient {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }

  /// Case-insensitive substring match on either name.
  pub fn name_matches(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.first_name.to_lowercase().contains(&needle)
      || self.last_name.to_lowercase().contains(&needle)
  }
}

/// Input to [`crate::store::CareStore::add_patient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatient {
  pub first_name:              String,
  pub last_name:               String,
  pub date_of_birth:           NaiveDate,
  pub admission_date:          NaiveDate,
  pub expected_discharge_date: Option<NaiveDate>,
  pub medical_history:         Option<String>,
  pub status:                  PatientStatus,
}

// ─── Activities ──────────────────────────────────────────────────────────────

/// A therapy session or other activity scheduled for a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
  pub id:             Uuid,
  pub patient_id:     Uuid,
  pub name:           String,
  pub description:    Option<String>,
  pub scheduled_date: DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
  /// Profile id of whoever marked it completed.
  pub completed_by:   Option<Uuid>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

impl Activity {
  pub fn is_completed(&self) -> bool { self.completed_at.is_some() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
  pub patient_id:     Uuid,
  pub name:           String,
  pub description:    Option<String>,
  pub scheduled_date: DateTime<Utc>,
}

/// Share of `activities` that are completed, in percent. Zero for an empty
/// slice.
pub fn completion_rate(activities: &[Activity]) -> f64 {
  if activities.is_empty() {
    return 0.0;
  }
  let done = activities.iter().filter(|a| a.is_completed()).count();
  done as f64 / activities.len() as f64 * 100.0
}

// ─── Progress notes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProgress {
  pub id:           Uuid,
  pub patient_id:   Uuid,
  /// Profile id of the author.
  pub therapist_id: Uuid,
  pub notes:        String,
  pub session_date: NaiveDate,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgress {
  pub patient_id:   Uuid,
  pub therapist_id: Uuid,
  pub notes:        String,
  pub session_date: NaiveDate,
}

// ─── Link tables ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientTherapist {
  pub id:           Uuid,
  pub patient_id:   Uuid,
  pub therapist_id: Uuid,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFamily {
  pub id:               Uuid,
  pub patient_id:       Uuid,
  pub family_member_id: Uuid,
  /// Free text, e.g. "daughter".
  pub relationship:     String,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// A family link with the patient row expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyPatient {
  pub link:    PatientFamily,
  pub patient: Patient,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn activity(completed: bool) -> Activity {
    let now = Utc::now();
    Activity {
      id:             Uuid::new_v4(),
      patient_id:     Uuid::new_v4(),
      name:           "Gait training".into(),
      description:    None,
      scheduled_date: now,
      completed_at:   completed.then_some(now),
      completed_by:   None,
      created_at:     now,
      updated_at:     now,
    }
  }

  #[test]
  fn completion_rate_of_empty_is_zero() {
    assert_eq!(completion_rate(&[]), 0.0);
  }

  #[test]
  fn completion_rate_counts_completed() {
    let list = [activity(true), activity(false), activity(false), activity(true)];
    assert_eq!(completion_rate(&list), 50.0);
  }

  #[test]
  fn status_text_matches_column_values() {
    assert_eq!(PatientStatus::OnLeave.as_ref(), "on_leave");
    assert_eq!("discharged".parse::<PatientStatus>().unwrap(), PatientStatus::Discharged);
  }
}

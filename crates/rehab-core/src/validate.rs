//! Form validation.
//!
//! Each form is a plain struct of strings, as submitted. `validate` turns it
//! into the typed input for the store or returns every field-level problem
//! at once.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  record::{NewActivity, NewPatient, NewProgress, PatientStatus},
  role::Role,
  session::NewAccount,
};

/// Minimum password length, enforced before any network call.
pub const MIN_PASSWORD_LEN: usize = 6;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  pub field:   String,
  pub message: String,
}

/// All problems found in one submission. Never empty when returned as `Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invalid form: {}", FieldList(.errors))]
pub struct ValidationErrors {
  pub errors: Vec<FieldError>,
}

impl ValidationErrors {
  pub fn push(&mut self, field: &str, message: impl Into<String>) {
    self.errors.push(FieldError { field: field.to_owned(), message: message.into() });
  }

  pub fn is_empty(&self) -> bool { self.errors.is_empty() }

  /// Messages reported for `field`.
  pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    self
      .errors
      .iter()
      .filter(move |e| e.field == field)
      .map(|e| e.message.as_str())
  }

  fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
    if self.is_empty() { Ok(value()) } else { Err(self) }
  }
}

struct FieldList<'a>(&'a [FieldError]);

impl fmt::Display for FieldList<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, e) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("; ")?;
      }
      write!(f, "{}: {}", e.field, e.message)?;
    }
    Ok(())
  }
}

// ─── Field helpers ───────────────────────────────────────────────────────────

fn min_chars(errs: &mut ValidationErrors, field: &str, value: &str, min: usize, message: &str) {
  if value.trim().chars().count() < min {
    errs.push(field, message);
  }
}

fn required_date(errs: &mut ValidationErrors, field: &str, value: &str, label: &str) -> Option<NaiveDate> {
  let value = value.trim();
  if value.is_empty() {
    errs.push(field, format!("{label} is required"));
    return None;
  }
  match NaiveDate::parse_from_str(value, DATE_FORMAT) {
    Ok(d) => Some(d),
    Err(_) => {
      errs.push(field, format!("{label} must be a date (YYYY-MM-DD)"));
      None
    }
  }
}

fn uuid_field(errs: &mut ValidationErrors, field: &str, value: &str) -> Option<Uuid> {
  match Uuid::parse_str(value.trim()) {
    Ok(id) => Some(id),
    Err(_) => {
      errs.push(field, "Invalid patient ID");
      None
    }
  }
}

/// Accept RFC 3339, or the `datetime-local` form (`YYYY-MM-DDTHH:MM`) read as
/// UTC.
fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(value)
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(value, DATETIME_LOCAL_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

fn looks_like_email(value: &str) -> bool {
  value
    .split_once('@')
    .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
}

// ─── Auth forms ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignInForm {
  pub email:    String,
  pub password: String,
}

impl SignInForm {
  pub fn validate(&self) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();
    if self.email.trim().is_empty() {
      errs.push("email", "Email is required");
    }
    if self.password.is_empty() {
      errs.push("password", "Password is required");
    }
    errs.finish(|| ())
  }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignUpForm {
  pub email:      String,
  pub password:   String,
  pub first_name: String,
  pub last_name:  String,
}

impl SignUpForm {
  /// Validate and build the account, assigning `role` to the new profile.
  pub fn validate(self, role: Option<Role>) -> Result<NewAccount, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    if !looks_like_email(self.email.trim()) {
      errs.push("email", "Enter a valid email address");
    }
    if self.password.chars().count() < MIN_PASSWORD_LEN {
      errs.push(
        "password",
        format!("Password must be at least {MIN_PASSWORD_LEN} characters long"),
      );
    }
    min_chars(&mut errs, "first_name", &self.first_name, 1, "First name is required");
    min_chars(&mut errs, "last_name", &self.last_name, 1, "Last name is required");

    errs.finish(|| NewAccount {
      email: self.email.trim().to_lowercase(),
      password: self.password,
      first_name: self.first_name.trim().to_owned(),
      last_name: self.last_name.trim().to_owned(),
      role,
    })
  }
}

// ─── Patient form ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatientForm {
  pub first_name:              String,
  pub last_name:               String,
  pub date_of_birth:           String,
  pub admission_date:          String,
  #[serde(default)]
  pub expected_discharge_date: Option<String>,
  #[serde(default)]
  pub medical_history:         Option<String>,
  #[serde(default)]
  pub status:                  Option<PatientStatus>,
}

impl PatientForm {
  /// Defaults shown by an empty "new patient" form: both dates today, status
  /// active.
  pub fn defaults(today: NaiveDate) -> Self {
    let today = today.format(DATE_FORMAT).to_string();
    Self {
      date_of_birth: today.clone(),
      admission_date: today,
      status: Some(PatientStatus::Active),
      ..Self::default()
    }
  }

  pub fn validate(self) -> Result<NewPatient, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    min_chars(&mut errs, "first_name", &self.first_name, 2, "First name must be at least 2 characters");
    min_chars(&mut errs, "last_name", &self.last_name, 2, "Last name must be at least 2 characters");
    let date_of_birth = required_date(&mut errs, "date_of_birth", &self.date_of_birth, "Date of birth");
    let admission_date = required_date(&mut errs, "admission_date", &self.admission_date, "Admission date");

    let expected_discharge_date = match non_empty(self.expected_discharge_date) {
      Some(s) => required_date(&mut errs, "expected_discharge_date", &s, "Expected discharge date"),
      None => None,
    };

    match (date_of_birth, admission_date, errs.is_empty()) {
      (Some(date_of_birth), Some(admission_date), true) => Ok(NewPatient {
        first_name: self.first_name.trim().to_owned(),
        last_name: self.last_name.trim().to_owned(),
        date_of_birth,
        admission_date,
        expected_discharge_date,
        medical_history: non_empty(self.medical_history),
        status: self.status.unwrap_or_default(),
      }),
      _ => Err(errs),
    }
  }
}

// ─── Activity form ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActivityForm {
  pub patient_id:     String,
  pub name:           String,
  #[serde(default)]
  pub description:    Option<String>,
  pub scheduled_date: String,
}

impl ActivityForm {
  pub fn validate(self) -> Result<NewActivity, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    let patient_id = uuid_field(&mut errs, "patient_id", &self.patient_id);
    min_chars(&mut errs, "name", &self.name, 2, "Activity name must be at least 2 characters");

    let raw_date = self.scheduled_date.trim();
    let scheduled_date = if raw_date.is_empty() {
      errs.push("scheduled_date", "Scheduled date is required");
      None
    } else {
      let parsed = parse_instant(raw_date);
      if parsed.is_none() {
        errs.push("scheduled_date", "Scheduled date must be a date and time");
      }
      parsed
    };

    match (patient_id, scheduled_date, errs.is_empty()) {
      (Some(patient_id), Some(scheduled_date), true) => Ok(NewActivity {
        patient_id,
        name: self.name.trim().to_owned(),
        description: non_empty(self.description),
        scheduled_date,
      }),
      _ => Err(errs),
    }
  }
}

// ─── Progress form ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProgressForm {
  pub patient_id:   String,
  pub notes:        String,
  pub session_date: String,
}

impl ProgressForm {
  /// Validate; the note is attributed to `author`.
  pub fn validate(self, author: Uuid) -> Result<NewProgress, ValidationErrors> {
    let mut errs = ValidationErrors::default();
    let patient_id = uuid_field(&mut errs, "patient_id", &self.patient_id);
    min_chars(&mut errs, "notes", &self.notes, 10, "Progress notes must be at least 10 characters");
    let session_date = required_date(&mut errs, "session_date", &self.session_date, "Session date");

    match (patient_id, session_date, errs.is_empty()) {
      (Some(patient_id), Some(session_date), true) => Ok(NewProgress {
        patient_id,
        therapist_id: author,
        notes: self.notes.trim().to_owned(),
        session_date,
      }),
      _ => Err(errs),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sign_up(password: &str) -> SignUpForm {
    SignUpForm {
      email:      "ana@example.com".into(),
      password:   password.into(),
      first_name: "Ana".into(),
      last_name:  "Silva".into(),
    }
  }

  #[test]
  fn five_character_password_is_rejected() {
    let errs = sign_up("12345").validate(Some(Role::Staff)).unwrap_err();
    assert_eq!(errs.errors.len(), 1);
    assert_eq!(errs.errors[0].field, "password");
  }

  #[test]
  fn six_character_password_is_accepted() {
    let account = sign_up("123456").validate(Some(Role::Staff)).unwrap();
    assert_eq!(account.role, Some(Role::Staff));
    assert_eq!(account.email, "ana@example.com");
  }

  #[test]
  fn email_needs_an_at_sign_with_both_sides() {
    let with_email = |email: &str| SignUpForm { email: email.into(), ..sign_up("123456") };
    assert!(with_email("ops@localhost").validate(None).is_ok());
    assert!(with_email(" ana@example.com ").validate(None).is_ok());
    for bad in ["ana.example.com", "@example.com", "ana@"] {
      let errs = with_email(bad).validate(None).unwrap_err();
      assert_eq!(errs.errors[0].field, "email", "{bad}");
    }
  }

  #[test]
  fn sign_up_reports_every_field() {
    let errs = SignUpForm::default().validate(None).unwrap_err();
    let fields: Vec<_> = errs.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, ["email", "password", "first_name", "last_name"]);
  }

  #[test]
  fn sign_in_requires_both_fields() {
    let errs = SignInForm::default().validate().unwrap_err();
    assert_eq!(errs.errors.len(), 2);
  }

  #[test]
  fn patient_form_defaults_validate_once_names_are_filled() {
    let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut form = PatientForm::defaults(today);
    form.first_name = "Maria".into();
    form.last_name = "Souza".into();
    form.medical_history = Some("   ".into());
    let patient = form.validate().unwrap();
    assert_eq!(patient.admission_date, today);
    assert_eq!(patient.status, PatientStatus::Active);
    assert_eq!(patient.medical_history, None);
  }

  #[test]
  fn patient_form_rejects_short_names_and_bad_dates() {
    let form = PatientForm {
      first_name: "M".into(),
      last_name: "Souza".into(),
      date_of_birth: "01/02/1950".into(),
      admission_date: String::new(),
      ..PatientForm::default()
    };
    let errs = form.validate().unwrap_err();
    assert_eq!(errs.for_field("first_name").count(), 1);
    assert_eq!(errs.for_field("date_of_birth").count(), 1);
    assert_eq!(
      errs.for_field("admission_date").collect::<Vec<_>>(),
      ["Admission date is required"]
    );
  }

  #[test]
  fn activity_accepts_datetime_local() {
    let form = ActivityForm {
      patient_id:     Uuid::new_v4().to_string(),
      name:           "Hydrotherapy".into(),
      description:    Some(String::new()),
      scheduled_date: "2024-05-02T14:30".into(),
    };
    let activity = form.validate().unwrap();
    assert_eq!(activity.scheduled_date.to_rfc3339(), "2024-05-02T14:30:00+00:00");
    assert_eq!(activity.description, None);
  }

  #[test]
  fn activity_rejects_bad_patient_id() {
    let form = ActivityForm {
      patient_id:     "nope".into(),
      name:           "Hydrotherapy".into(),
      description:    None,
      scheduled_date: "2024-05-02T14:30:00Z".into(),
    };
    let errs = form.validate().unwrap_err();
    assert_eq!(errs.for_field("patient_id").collect::<Vec<_>>(), ["Invalid patient ID"]);
  }

  #[test]
  fn progress_notes_need_ten_characters() {
    let author = Uuid::new_v4();
    let form = ProgressForm {
      patient_id:   Uuid::new_v4().to_string(),
      notes:        "too short".into(),
      session_date: "2024-05-02".into(),
    };
    assert!(form.validate(author).is_err());

    let form = ProgressForm {
      patient_id:   Uuid::new_v4().to_string(),
      notes:        "Walked 20m with support".into(),
      session_date: "2024-05-02".into(),
    };
    assert_eq!(form.validate(author).unwrap().therapist_id, author);
  }

  #[test]
  fn display_lists_fields() {
    let mut errs = ValidationErrors::default();
    errs.push("a", "bad");
    errs.push("b", "worse");
    assert_eq!(errs.to_string(), "invalid form: a: bad; b: worse");
  }
}

//! SQL schema for the RehabCare SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Identities owned by the auth service.
CREATE TABLE IF NOT EXISTS users (
    id                   TEXT PRIMARY KEY,
    email                TEXT NOT NULL UNIQUE,
    password_hash        TEXT NOT NULL,     -- argon2 PHC string
    email_confirmed_at   TEXT,
    confirmation_digest  TEXT UNIQUE,       -- sha256 of the pending token
    created_at           TEXT NOT NULL
);

-- Only token digests are stored; the tokens themselves live with the client.
CREATE TABLE IF NOT EXISTS sessions (
    access_digest   TEXT PRIMARY KEY,
    refresh_digest  TEXT NOT NULL UNIQUE,
    user_id         TEXT NOT NULL REFERENCES users(id),
    created_at      TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    revoked_at      TEXT
);

CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY REFERENCES users(id),
    first_name  TEXT,
    last_name   TEXT,
    role        TEXT,                       -- free text; see RoleAssignment
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id                       TEXT PRIMARY KEY,
    first_name               TEXT NOT NULL,
    last_name                TEXT NOT NULL,
    date_of_birth            TEXT NOT NULL,
    admission_date           TEXT NOT NULL,
    expected_discharge_date  TEXT,
    medical_history          TEXT,
    status                   TEXT DEFAULT 'active',
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activities (
    id              TEXT PRIMARY KEY,
    patient_id      TEXT NOT NULL REFERENCES patients(id),
    name            TEXT NOT NULL,
    description     TEXT,
    scheduled_date  TEXT NOT NULL,
    completed_at    TEXT,
    completed_by    TEXT REFERENCES profiles(id),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patient_progress (
    id            TEXT PRIMARY KEY,
    patient_id    TEXT NOT NULL REFERENCES patients(id),
    therapist_id  TEXT NOT NULL REFERENCES profiles(id),
    notes         TEXT NOT NULL,
    session_date  TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patient_therapists (
    id            TEXT PRIMARY KEY,
    patient_id    TEXT NOT NULL REFERENCES patients(id),
    therapist_id  TEXT NOT NULL REFERENCES profiles(id),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (patient_id, therapist_id)
);

CREATE TABLE IF NOT EXISTS patient_family (
    id                TEXT PRIMARY KEY,
    patient_id        TEXT NOT NULL REFERENCES patients(id),
    family_member_id  TEXT NOT NULL REFERENCES profiles(id),
    relationship      TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (patient_id, family_member_id)
);

CREATE INDEX IF NOT EXISTS sessions_user_idx        ON sessions(user_id);
CREATE INDEX IF NOT EXISTS activities_patient_idx   ON activities(patient_id);
CREATE INDEX IF NOT EXISTS activities_scheduled_idx ON activities(scheduled_date);
CREATE INDEX IF NOT EXISTS progress_patient_idx     ON patient_progress(patient_id);

PRAGMA user_version = 1;
";

//! The [`AuthService`] half of [`SqliteStore`]: password identities and
//! token sessions.
//!
//! Passwords are stored as argon2 PHC strings; session and confirmation
//! tokens only as SHA-256 digests (see `token.rs`). A session is live while
//! it is neither revoked nor past `expires_at`. Refresh tokens stay usable
//! after the access token expires, until they are exchanged or revoked.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction};
use uuid::Uuid;

use rehab_core::{
  AuthFailure,
  session::{NewAccount, Session, SignUpOutcome, User},
  store::AuthService,
  validate::MIN_PASSWORD_LEN,
};

use crate::{
  encode::{RawUser, USER_COLUMNS, encode_dt, encode_uuid},
  store::SqliteStore,
  token::{digest, generate_token, hash_password, verify_password},
  Error, Result,
};

const TOKEN_TYPE: &str = "bearer";

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Freshly minted tokens plus the digests that get persisted.
struct IssuedTokens {
  access:     String,
  refresh:    String,
  expires_at: DateTime<Utc>,
}

impl IssuedTokens {
  fn new(now: DateTime<Utc>, ttl: chrono::TimeDelta) -> Self {
    Self {
      access:     generate_token(),
      refresh:    generate_token(),
      expires_at: now + ttl,
    }
  }

  fn into_session(self, user: User) -> Session {
    Session {
      access_token:  self.access,
      refresh_token: self.refresh,
      token_type:    TOKEN_TYPE.to_owned(),
      expires_at:    self.expires_at,
      user,
    }
  }
}

/// Insert a session row. Runs on the connection thread.
fn insert_session(
  tx: &Transaction<'_>,
  access_digest: &str,
  refresh_digest: &str,
  user_id: &str,
  now: &str,
  expires_at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO sessions (access_digest, refresh_digest, user_id, created_at, expires_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![access_digest, refresh_digest, user_id, now, expires_at],
  )?;
  Ok(())
}

fn select_user(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<RawUser> {
  tx.query_row(
    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
    rusqlite::params![id],
    RawUser::from_row,
  )
}

impl SqliteStore {
  /// Create and persist a session for `user`.
  async fn issue_session(&self, user: User) -> Result<Session> {
    let now    = Utc::now();
    let tokens = IssuedTokens::new(now, self.policy.session_ttl);

    let access_digest  = digest(&tokens.access);
    let refresh_digest = digest(&tokens.refresh);
    let user_str       = encode_uuid(user.id);
    let now_str        = encode_dt(now);
    let expires_str    = encode_dt(tokens.expires_at);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_session(&tx, &access_digest, &refresh_digest, &user_str, &now_str, &expires_str)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(user = %user.id, expires_at = %tokens.expires_at, "session issued");
    Ok(tokens.into_session(user))
  }

  /// Look up a user together with its password hash.
  async fn credentials(&self, email: String) -> Result<Option<(RawUser, String)>> {
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
              rusqlite::params![email],
              |row| Ok((RawUser::from_row(row)?, row.get::<_, String>(4)?)),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(found)
  }
}

// ─── AuthService impl ────────────────────────────────────────────────────────

impl AuthService for SqliteStore {
  type Error = Error;

  async fn sign_up(&self, account: NewAccount) -> Result<SignUpOutcome> {
    if account.password.chars().count() < MIN_PASSWORD_LEN {
      return Err(AuthFailure::WeakPassword(MIN_PASSWORD_LEN).into());
    }

    let password = account.password;
    let phc = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let now     = Utc::now();
    let confirm = self.policy.require_email_confirmation;
    let user = User {
      id:                 Uuid::new_v4(),
      email:              normalize_email(&account.email),
      email_confirmed_at: (!confirm).then_some(now),
      created_at:         now,
    };
    let confirmation_token = confirm.then(generate_token);

    let id_str       = encode_uuid(user.id);
    let email        = user.email.clone();
    let confirmed    = user.email_confirmed_at.map(encode_dt);
    let confirm_hash = confirmation_token.as_deref().map(digest);
    let now_str      = encode_dt(now);
    let first        = account.first_name;
    let last         = account.last_name;
    let role_str     = account.role.map(|r| r.as_ref().to_owned());

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let taken = tx
          .query_row("SELECT 1 FROM users WHERE email = ?1", rusqlite::params![email], |_| {
            Ok(())
          })
          .optional()?
          .is_some();
        if taken {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO users (
             id, email, password_hash, email_confirmed_at, confirmation_digest, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, email, phc, confirmed, confirm_hash, now_str],
        )?;
        tx.execute(
          "INSERT INTO profiles (id, first_name, last_name, role, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          rusqlite::params![id_str, first, last, role_str, now_str],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await;

    match inserted {
      Ok(true) => {}
      Ok(false) => return Err(AuthFailure::EmailTaken.into()),
      Err(e) if is_unique_violation(&e) => return Err(AuthFailure::EmailTaken.into()),
      Err(e) => return Err(e.into()),
    }

    tracing::info!(user = %user.id, confirmation_required = confirm, "account created");

    let session = if confirm { None } else { Some(self.issue_session(user.clone()).await?) };
    Ok(SignUpOutcome { user, session, confirmation_token })
  }

  async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
    let Some((raw, phc)) = self.credentials(normalize_email(email)).await? else {
      return Err(AuthFailure::InvalidCredentials.into());
    };

    let password = password.to_owned();
    let valid =
      tokio::task::spawn_blocking(move || verify_password(&password, &phc)).await??;
    if !valid {
      return Err(AuthFailure::InvalidCredentials.into());
    }

    let user = raw.into_user()?;
    if self.policy.require_email_confirmation && user.email_confirmed_at.is_none() {
      return Err(AuthFailure::EmailNotConfirmed.into());
    }

    self.issue_session(user).await
  }

  async fn confirm_email(&self, token: &str) -> Result<User> {
    let confirm_hash = digest(token);
    let now_str      = encode_dt(Utc::now());

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id: Option<String> = tx
          .query_row(
            "SELECT id FROM users WHERE confirmation_digest = ?1",
            rusqlite::params![confirm_hash],
            |r| r.get(0),
          )
          .optional()?;
        let Some(id) = id else { return Ok(None) };
        tx.execute(
          "UPDATE users SET email_confirmed_at = ?2, confirmation_digest = NULL WHERE id = ?1",
          rusqlite::params![id, now_str],
        )?;
        let raw = select_user(&tx, &id)?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw
      .ok_or_else(|| AuthFailure::InvalidToken.into())
      .and_then(RawUser::into_user)
  }

  async fn get_user(&self, access_token: &str) -> Result<Option<User>> {
    let access_digest = digest(access_token);
    let now_str       = encode_dt(Utc::now());

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT u.id, u.email, u.email_confirmed_at, u.created_at
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.access_digest = ?1
                 AND s.revoked_at IS NULL
                 AND s.expires_at > ?2",
              rusqlite::params![access_digest, now_str],
              RawUser::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
    let now    = Utc::now();
    let tokens = IssuedTokens::new(now, self.policy.session_ttl);

    let old_digest     = digest(refresh_token);
    let access_digest  = digest(&tokens.access);
    let refresh_digest = digest(&tokens.refresh);
    let now_str        = encode_dt(now);
    let expires_str    = encode_dt(tokens.expires_at);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let user_id: Option<String> = tx
          .query_row(
            "SELECT user_id FROM sessions WHERE refresh_digest = ?1 AND revoked_at IS NULL",
            rusqlite::params![old_digest],
            |r| r.get(0),
          )
          .optional()?;
        let Some(user_id) = user_id else { return Ok(None) };
        tx.execute(
          "UPDATE sessions SET revoked_at = ?2 WHERE refresh_digest = ?1",
          rusqlite::params![old_digest, now_str],
        )?;
        insert_session(&tx, &access_digest, &refresh_digest, &user_id, &now_str, &expires_str)?;
        let raw = select_user(&tx, &user_id)?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    let user = raw.ok_or(AuthFailure::InvalidToken)?.into_user()?;
    tracing::debug!(user = %user.id, "session refreshed");
    Ok(tokens.into_session(user))
  }

  async fn sign_out(&self, access_token: &str) -> Result<()> {
    let access_digest = digest(access_token);
    let now_str       = encode_dt(Utc::now());

    let revoked = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions SET revoked_at = ?2 WHERE access_digest = ?1 AND revoked_at IS NULL",
          rusqlite::params![access_digest, now_str],
        )?)
      })
      .await?;

    tracing::debug!(revoked, "sign-out");
    Ok(())
  }

  async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
    self
      .credentials(normalize_email(email))
      .await?
      .map(|(raw, _)| raw.into_user())
      .transpose()
  }
}

//! Opaque tokens and password hashing.
//!
//! Tokens are 32 random bytes, URL-safe base64 without padding. Only the
//! SHA-256 digest of a token is ever written to the database, so a leaked
//! database file cannot be replayed as live sessions.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const TOKEN_BYTES: usize = 32;

pub fn generate_token() -> String {
  let mut buf = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut buf);
  URL_SAFE_NO_PAD.encode(buf)
}

/// Hex-encoded SHA-256 of a token; the lookup key stored in SQLite.
pub fn digest(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}

/// Produce an argon2 PHC string. CPU-heavy; call from a blocking task.
pub fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

/// `false` for a wrong password; `Err` only if the stored hash is corrupt.
pub fn verify_password(password: &str, phc: &str) -> Result<bool> {
  let parsed = PasswordHash::new(phc).map_err(|e| Error::PasswordHash(e.to_string()))?;
  Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokens_are_unique_and_url_safe() {
    let a = generate_token();
    let b = generate_token();
    assert_ne!(a, b);
    assert_eq!(a.len(), 43);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
  }

  #[test]
  fn digest_is_stable_hex() {
    assert_eq!(digest("abc"), digest("abc"));
    assert_ne!(digest("abc"), digest("abd"));
    assert_eq!(digest("abc").len(), 64);
  }

  #[test]
  fn password_round_trip() {
    let phc = hash_password("hunter22").unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(verify_password("hunter22", &phc).unwrap());
    assert!(!verify_password("hunter23", &phc).unwrap());
  }

  #[test]
  fn corrupt_hash_is_an_error() {
    assert!(verify_password("x", "not-a-phc-string").is_err());
  }
}

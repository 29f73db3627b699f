//! Error type for `pir-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pir_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A project setting the backend needs is absent or empty.
  #[error("missing project setting: {0}")]
  MissingConfig(&'static str),

  #[error("document not found: {collection}/{id}")]
  NotFound { collection: String, id: String },

  #[error("document {collection}/{id} must be a JSON object")]
  NotAnObject { collection: String, id: String },

  #[error("email already in use: {0}")]
  EmailInUse(String),

  #[error("password must be at least {min} characters")]
  WeakPassword { min: usize },

  /// Unknown email or wrong password; which one is not disclosed.
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("no account with uid {0}")]
  UnknownAccount(String),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

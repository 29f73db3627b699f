//! Encoding and decoding helpers between core types and the plain-text
//! representations stored in SQLite columns.
//!
//! Document bodies and claims are stored as compact JSON; bookkeeping
//! timestamps as RFC 3339 strings.

use chrono::{DateTime, Utc};
use pir_core::{
  auth::{AuthUser, Claims},
  store::Document,
};
use serde_json::Value;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Document bodies ─────────────────────────────────────────────────────────

/// Serialise a document body, refusing anything but a JSON object.
pub fn encode_data(collection: &str, id: &str, data: &Value) -> Result<String> {
  if !data.is_object() {
    return Err(Error::NotAnObject {
      collection: collection.to_owned(),
      id:         id.to_owned(),
    });
  }
  Ok(serde_json::to_string(data)?)
}

// ─── Claims ──────────────────────────────────────────────────────────────────

pub fn encode_claims(claims: &Claims) -> Result<String> {
  Ok(serde_json::to_string(claims)?)
}

pub fn decode_claims(s: &str) -> Result<Claims> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `documents` row.
pub struct RawDocument {
  pub doc_id:    String,
  pub data_json: String,
}

impl RawDocument {
  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      id:   self.doc_id,
      data: serde_json::from_str(&self.data_json)?,
    })
  }
}

/// Raw strings read directly from an `accounts` row.
pub struct RawAccount {
  pub uid:           String,
  pub email:         String,
  pub password_hash: String,
  pub display_name:  Option<String>,
  pub claims_json:   Option<String>,
}

impl RawAccount {
  pub const COLUMNS: &'static str =
    "uid, email, password_hash, display_name, claims_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:           row.get(0)?,
      email:         row.get(1)?,
      password_hash: row.get(2)?,
      display_name:  row.get(3)?,
      claims_json:   row.get(4)?,
    })
  }

  /// The identity this account presents once signed in.
  pub fn into_auth_user(self) -> Result<AuthUser> {
    Ok(AuthUser {
      uid:          self.uid,
      email:        self.email,
      display_name: self.display_name,
      claims:       self.claims_json.as_deref().map(decode_claims).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use pir_core::entity::UserRole;
  use serde_json::json;

  use super::*;

  #[test]
  fn data_must_be_an_object() {
    assert!(encode_data("pirs", "p1", &json!({ "title": "x" })).is_ok());
    assert!(matches!(
      encode_data("pirs", "p1", &json!([1, 2])),
      Err(Error::NotAnObject { .. })
    ));
  }

  #[test]
  fn account_row_decodes_claims() {
    let raw = RawAccount {
      uid:           "u1".into(),
      email:         "a@example.com".into(),
      password_hash: "$argon2id$...".into(),
      display_name:  None,
      claims_json:   Some(r#"{"role":"reviewer"}"#.into()),
    };
    let user = raw.into_auth_user().unwrap();
    assert_eq!(user.role(), Some(UserRole::Reviewer));
  }
}

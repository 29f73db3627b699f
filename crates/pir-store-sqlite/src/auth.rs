//! Email/password accounts for [`SqliteStore`].
//!
//! Passwords are stored as argon2 PHC strings. The store tracks a single
//! session, published on a watch channel.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use chrono::Utc;
use pir_core::{
  auth::{AuthProvider, AuthUser, Claims},
  entity::UserRole,
};
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawAccount, encode_claims, encode_dt},
  store::SqliteStore,
};

/// Shortest password accepted by [`AuthProvider::sign_up`].
pub const MIN_PASSWORD_LEN: usize = 6;

fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}

impl SqliteStore {
  async fn load_account(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<RawAccount>> {
    let sql = format!("SELECT {} FROM accounts WHERE {column} = ?1", RawAccount::COLUMNS);
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn
            .query_row(&sql, rusqlite::params![value], RawAccount::from_row)
            .optional()?)
        })
        .await?,
    )
  }
}

// ─── AuthProvider impl ───────────────────────────────────────────────────────

impl AuthProvider for SqliteStore {
  type Error = Error;

  async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
    let account = self
      .load_account("email", email.trim().to_owned())
      .await?
      .ok_or(Error::InvalidCredentials)?;

    if !verify_password(password, &account.password_hash) {
      return Err(Error::InvalidCredentials);
    }

    let user = account.into_auth_user()?;
    info!(uid = %user.uid, "signed in");
    self.session.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
    if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::WeakPassword { min: MIN_PASSWORD_LEN });
    }

    let user = AuthUser {
      uid:          Uuid::new_v4().simple().to_string(),
      email:        email.trim().to_owned(),
      display_name: None,
      claims:       None,
    };
    let password_hash = hash_password(password)?;
    let created_at = encode_dt(Utc::now());
    let (uid, address) = (user.uid.clone(), user.email.clone());

    let created: bool = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM accounts WHERE email = ?1",
            rusqlite::params![address],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }

        conn.execute(
          "INSERT INTO accounts (uid, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![uid, address, password_hash, created_at],
        )?;
        Ok(true)
      })
      .await?;

    if !created {
      return Err(Error::EmailInUse(user.email));
    }

    info!(uid = %user.uid, "account created");
    self.session.send_replace(Some(user.clone()));
    Ok(user)
  }

  async fn sign_out(&self) -> Result<()> {
    if let Some(user) = self.session.send_replace(None) {
      info!(uid = %user.uid, "signed out");
    }
    Ok(())
  }

  async fn set_role_claim(&self, uid: &str, role: UserRole) -> Result<AuthUser> {
    let claims_json = encode_claims(&Claims { role })?;
    let id = uid.to_owned();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE accounts SET claims_json = ?2 WHERE uid = ?1",
          rusqlite::params![id, claims_json],
        )?)
      })
      .await?;
    if updated == 0 {
      return Err(Error::UnknownAccount(uid.to_owned()));
    }

    let user = self
      .load_account("uid", uid.to_owned())
      .await?
      .ok_or_else(|| Error::UnknownAccount(uid.to_owned()))?
      .into_auth_user()?;

    info!(uid, role = role.as_str(), "role claim set");
    self.session.send_if_modified(|current| match current {
      Some(signed_in) if signed_in.uid == user.uid => {
        *signed_in = user.clone();
        true
      }
      _ => false,
    });
    Ok(user)
  }

  fn current_user(&self) -> Option<AuthUser> { self.session.borrow().clone() }

  fn on_auth_state_changed(&self) -> watch::Receiver<Option<AuthUser>> {
    self.session.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn password_hash_verifies() {
    let phc = hash_password("hunter22").unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(verify_password("hunter22", &phc));
    assert!(!verify_password("hunter23", &phc));
    assert!(!verify_password("hunter22", "not a phc string"));
  }
}

//! The `AuthProvider` trait and the authenticated identity it hands out.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::entity::UserRole;

/// Custom claims attached to an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  pub role: UserRole,
}

/// The identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
  pub uid:          String,
  pub email:        String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub claims:       Option<Claims>,
}

impl AuthUser {
  /// The role claim, if one has been granted.
  pub fn role(&self) -> Option<UserRole> { self.claims.as_ref().map(|c| c.role) }
}

/// Abstraction over an authentication backend.
///
/// A provider tracks one session: at most one user is signed in at a time,
/// and every change is published through [`AuthProvider::on_auth_state_changed`].
/// Errors (bad credentials, email already in use, ...) are the backend's own.
pub trait AuthProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Sign in with email and password, replacing any current session.
  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthUser, Self::Error>> + Send + 'a;

  /// Create an account and sign it in.
  fn sign_up<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<AuthUser, Self::Error>> + Send + 'a;

  /// End the current session. Signing out while signed out is a no-op.
  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Attach a role claim to the account `uid` and return the updated
  /// identity. If `uid` is the current user, observers see the new claims.
  fn set_role_claim<'a>(
    &'a self,
    uid: &'a str,
    role: UserRole,
  ) -> impl Future<Output = Result<AuthUser, Self::Error>> + Send + 'a;

  /// The signed-in user, if any.
  fn current_user(&self) -> Option<AuthUser>;

  /// Observe auth-state transitions. The receiver starts with the current
  /// state and sees `Some(user)` on sign-in and `None` on sign-out.
  fn on_auth_state_changed(&self) -> watch::Receiver<Option<AuthUser>>;
}

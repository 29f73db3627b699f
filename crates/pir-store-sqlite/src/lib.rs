//! SQLite backend for the PIR data layer.
//!
//! One [`SqliteStore`] implements both [`pir_core::store::DocumentStore`] and
//! [`pir_core::auth::AuthProvider`]. All database access runs on the
//! [`tokio_rusqlite`] connection thread without blocking the async runtime.

mod auth;
mod bus;
mod encode;
mod schema;
mod store;

pub mod error;

pub use bus::{Change, ChangeBus};
pub use error::{Error, Result};
pub use store::SqliteStore;

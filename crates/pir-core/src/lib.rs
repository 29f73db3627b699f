//! Core types and trait definitions for the PIR data-access layer.
//!
//! The entity model exists in two forms that differ only in how instants are
//! represented: storage form carries [`timestamp::Timestamp`] handles, and
//! application form carries ISO-8601 strings. [`convert`] maps between them,
//! [`client`] does so on every read and write against a [`store::DocumentStore`].
//!
//! This crate has no database dependencies; backends implement its traits.

#![allow(async_fn_in_trait)]

pub mod auth;
pub mod client;
pub mod config;
pub mod convert;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod timestamp;

pub use error::{Error, Result};

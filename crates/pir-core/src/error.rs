//! Error types for `pir-core`.

use thiserror::Error;

use crate::entity::{PirStatus, QuestionType};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("timestamp out of range: {seconds}s + {nanoseconds}ns")]
  TimestampOutOfRange { seconds: i64, nanoseconds: u32 },

  /// A required timestamp field was empty on the way into storage.
  #[error("required timestamp `{0}` is missing")]
  MissingTimestamp(&'static str),

  #[error("a PIR must reference at least one tag")]
  NoTags,

  #[error("a question must belong to at least one tag")]
  QuestionWithoutTags,

  #[error("question of type {0:?} requires options")]
  MissingOptions(QuestionType),

  #[error("question of type {0:?} must not carry options")]
  UnexpectedOptions(QuestionType),

  #[error("illegal PIR transition from {from:?} to {to:?}")]
  IllegalTransition { from: PirStatus, to: PirStatus },

  /// A lifecycle field is populated although the status has not reached the
  /// stage that sets it.
  #[error("`{field}` is set but the PIR is only {status:?}")]
  PrematureField { field: &'static str, status: PirStatus },

  /// A lifecycle field is absent although the status implies it was set.
  #[error("`{field}` is missing for a {status:?} PIR")]
  MissingLifecycleField { field: &'static str, status: PirStatus },

  #[error("history entry at {0} predates the last recorded entry")]
  HistoryOutOfOrder(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! The storage timestamp handle and its ISO-8601 adapter.
//!
//! Documents in the store carry timestamps as `{seconds, nanoseconds}`
//! handles. Everything above the store sees ISO-8601 strings in UTC with
//! millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Earliest representable instant: `0001-01-01T00:00:00Z`.
const MIN_SECONDS: i64 = -62_135_596_800;
/// One past the latest representable instant: `10000-01-01T00:00:00Z`.
const MAX_SECONDS: i64 = 253_402_300_800;

// ─── Handle ──────────────────────────────────────────────────────────────────

/// A point in time as the document store persists it.
///
/// Ordering follows the instant. The serialised form is
/// `{"seconds": <i64>, "nanoseconds": <u32>}`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "RawTimestamp", try_from = "RawTimestamp")]
pub struct Timestamp(DateTime<Utc>);

#[derive(Serialize, Deserialize)]
struct RawTimestamp {
  seconds:     i64,
  nanoseconds: u32,
}

impl Timestamp {
  /// Build a handle from its raw components.
  pub fn new(seconds: i64, nanoseconds: u32) -> Result<Self> {
    if nanoseconds >= 1_000_000_000 || !(MIN_SECONDS..MAX_SECONDS).contains(&seconds) {
      return Err(Error::TimestampOutOfRange { seconds, nanoseconds });
    }
    DateTime::from_timestamp(seconds, nanoseconds)
      .map(Self)
      .ok_or(Error::TimestampOutOfRange { seconds, nanoseconds })
  }

  pub fn now() -> Self { Self(Utc::now()) }

  pub fn from_date(date: DateTime<Utc>) -> Result<Self> {
    Self::new(date.timestamp(), date.timestamp_subsec_nanos())
  }

  pub fn from_millis(millis: i64) -> Result<Self> {
    let seconds = millis.div_euclid(1000);
    let nanoseconds = (millis.rem_euclid(1000) * 1_000_000) as u32;
    Self::new(seconds, nanoseconds)
  }

  pub fn to_date(&self) -> DateTime<Utc> { self.0 }

  pub fn to_millis(&self) -> i64 { self.0.timestamp_millis() }

  pub fn seconds(&self) -> i64 { self.0.timestamp() }

  pub fn nanoseconds(&self) -> u32 { self.0.timestamp_subsec_nanos() }
}

impl From<Timestamp> for RawTimestamp {
  fn from(ts: Timestamp) -> Self {
    Self { seconds: ts.seconds(), nanoseconds: ts.nanoseconds() }
  }
}

impl TryFrom<RawTimestamp> for Timestamp {
  type Error = Error;

  fn try_from(raw: RawTimestamp) -> Result<Self> {
    Self::new(raw.seconds, raw.nanoseconds)
  }
}

impl fmt::Display for Timestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&format_iso(self.0))
  }
}

// ─── ISO-8601 ────────────────────────────────────────────────────────────────

/// Format an instant the way the application layer expects: UTC, three
/// fractional digits, `Z` suffix. Sub-millisecond precision is truncated.
pub fn format_iso(date: DateTime<Utc>) -> String {
  date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 string (any offset) or a bare `YYYY-MM-DD` date, which
/// is read as UTC midnight.
pub fn parse_iso(input: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(input, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
    .ok_or_else(|| Error::InvalidTimestamp(input.to_owned()))
}

/// Storage handle → application string. Absent stays absent.
pub fn to_application_string(handle: Option<&Timestamp>) -> Option<String> {
  handle.map(|ts| format_iso(ts.to_date()))
}

/// Application string → storage handle. Absent or empty input yields `None`.
pub fn to_storage_handle(iso: Option<&str>) -> Result<Option<Timestamp>> {
  match iso {
    None | Some("") => Ok(None),
    Some(s) => parse_iso(s).and_then(Timestamp::from_date).map(Some),
  }
}

//! Timestamp helpers.
//!
//! All timestamps are UTC with microsecond precision. The text form is
//! fixed-width RFC 3339 (`2024-05-01T08:30:00.000000Z`), so string order
//! equals time order.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// A UTC instant.
pub type Timestamp = DateTime<Utc>;

/// Returns the current time truncated to microseconds.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp in the fixed-width wire/storage form.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses any RFC 3339 / ISO-8601 timestamp with an offset into UTC.
pub fn parse_timestamp(value: &str) -> ProtocolResult<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(6))
        .map_err(|e| ProtocolError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

//! Value types shared by every stage of a harvest
//!
//! # Components
//!
//! - `Record`: one harvested catalog item, keyed by its `source_url`
//! - `Rating` / `RecordStatus`: fixed enumerations carried by a record
//! - `ChangeEvent` / `ChangeKind`: immutable facts appended to the change history

mod change;
mod record;

pub use change::{ChangeEvent, ChangeKind};
pub use record::{Rating, Record, RecordStatus};

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp the way it is persisted and reported
///
/// The fixed-width form (microseconds, `Z` suffix) keeps lexicographic and
/// chronological order identical.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

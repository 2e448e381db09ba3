//! Change event definitions
//!
//! Change events are append-only facts. The core creates them and hands them
//! to the store; it never mutates or deletes one afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NewRecord,
    Price,
    Availability,
    Description,
    Rating,
    Reviews,
}

impl ChangeKind {
    /// Returns all kinds in the order field comparisons emit them
    pub fn all() -> [Self; 6] {
        [
            Self::NewRecord,
            Self::Price,
            Self::Availability,
            Self::Description,
            Self::Rating,
            Self::Reviews,
        ]
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NewRecord => "new_record",
            Self::Price => "price",
            Self::Availability => "availability",
            Self::Description => "description",
            Self::Rating => "rating",
            Self::Reviews => "reviews",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|k| k.to_db_string() == s)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// An immutable record of one detected change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The `source_url` of the record that changed
    pub record_key: String,

    /// Store-assigned identity of the record
    pub record_id: i64,
    pub kind: ChangeKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        record_key: impl Into<String>,
        record_id: i64,
        kind: ChangeKind,
        old_value: Option<String>,
        new_value: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_key: record_key.into(),
            record_id,
            kind,
            old_value,
            new_value,
            occurred_at,
        }
    }
}

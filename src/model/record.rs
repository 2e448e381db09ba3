//! Harvested record definitions
//!
//! A `Record` is the fixed-shape value produced by the extractor for one
//! detail page. Every field is always populated; absent source data is
//! represented by an explicit default rather than a missing key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Star rating shown on a detail page, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rating {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl Rating {
    /// Returns all ratings in ascending order
    pub fn all() -> [Self; 5] {
        [Self::One, Self::Two, Self::Three, Self::Four, Self::Five]
    }

    /// Returns the canonical name, which is also the CSS class token on the page
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "One",
            Self::Two => "Two",
            Self::Three => "Three",
            Self::Four => "Four",
            Self::Five => "Five",
        }
    }

    /// Matches a single CSS class token (e.g. `Three` in `star-rating Three`)
    pub fn from_class_token(token: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.as_str() == token)
    }

    /// Numeric value from 1 to 5
    pub fn stars(&self) -> u8 {
        *self as u8 + 1
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Removed,
}

impl RecordStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// One catalog item as seen on its detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub description: String,
    pub category: String,

    /// Price including tax
    pub price_gross: f64,

    /// Price excluding tax
    pub price_net: f64,

    /// Free-text availability, e.g. "In stock (22 available)"
    pub availability: String,
    pub review_count: u32,

    /// Absolute URL of the cover image, empty when the page has none
    pub image_url: String,
    pub rating: Option<Rating>,

    /// Natural key: unique per record and never reused
    pub source_url: String,

    /// Hex digest over the tracked fields, see [`crate::detect::fingerprint`]
    pub fingerprint: String,
    pub status: RecordStatus,

    /// Raw page capture, dropped when larger than the configured cap
    pub snapshot: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Record {
    /// Creates a record with best-effort defaults for every field except the key
    pub fn new(source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut record = Self {
            name: String::new(),
            description: String::new(),
            category: String::new(),
            price_gross: 0.0,
            price_net: 0.0,
            availability: "Unknown".to_string(),
            review_count: 0,
            image_url: String::new(),
            rating: None,
            source_url: source_url.into(),
            fingerprint: String::new(),
            status: RecordStatus::Active,
            snapshot: None,
            first_seen_at: now,
            last_seen_at: now,
        };
        record.refresh_fingerprint();
        record
    }

    /// Recomputes `fingerprint` from the current field values
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = crate::detect::fingerprint(self);
    }

    /// Drops the snapshot if it exceeds `max_bytes`
    ///
    /// Returns true when a snapshot was dropped.
    pub fn cap_snapshot(&mut self, max_bytes: usize) -> bool {
        match &self.snapshot {
            Some(snapshot) if snapshot.len() > max_bytes => {
                self.snapshot = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_from_class_token() {
        assert_eq!(Rating::from_class_token("Three"), Some(Rating::Three));
        assert_eq!(Rating::from_class_token("star-rating"), None);
        assert_eq!(Rating::from_class_token("three"), None);
        assert_eq!(Rating::from_class_token(""), None);
    }

    #[test]
    fn test_rating_order_and_stars() {
        assert!(Rating::One < Rating::Five);
        assert_eq!(Rating::One.stars(), 1);
        assert_eq!(Rating::Five.stars(), 5);
    }

    #[test]
    fn test_record_status_db_strings() {
        for status in [RecordStatus::Active, RecordStatus::Removed] {
            assert_eq!(RecordStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(RecordStatus::from_db_string("deleted"), None);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = Record::new("https://example.com/a/index.html");
        assert_eq!(record.availability, "Unknown");
        assert_eq!(record.price_gross, 0.0);
        assert_eq!(record.status, RecordStatus::Active);
        assert_eq!(record.fingerprint.len(), 64);
    }

    #[test]
    fn test_cap_snapshot() {
        let mut record = Record::new("https://example.com/a");
        record.snapshot = Some("x".repeat(10));
        assert!(!record.cap_snapshot(10));
        assert!(record.snapshot.is_some());
        assert!(record.cap_snapshot(9));
        assert!(record.snapshot.is_none());
    }
}

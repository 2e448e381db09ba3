use crate::model::{ChangeEvent, ChangeKind, Rating, Record};
use crate::storage::{StorageResult, Store, StoredRecord};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Smallest gross price difference that counts as a price change
pub const PRICE_THRESHOLD: f64 = 0.01;

/// Marker stored instead of description text
const DESCRIPTION_MARKER: &str = "updated";

/// Outcome of running change detection on one record
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// True when the record was not in the store before
    pub is_new: bool,

    /// Store identity of the record
    pub record_id: i64,

    /// Events appended to the change log, in emission order
    pub events: Vec<ChangeEvent>,

    /// True when the stored record was overwritten
    pub written: bool,
}

impl Detection {
    fn unchanged(record_id: i64) -> Self {
        Self {
            is_new: false,
            record_id,
            events: Vec::new(),
            written: false,
        }
    }
}

/// Detects and persists changes for a freshly extracted record
///
/// The fingerprint is recomputed before any decision. The stored record is
/// only overwritten when at least one event is emitted, and the record and
/// its events are written together or not at all. Storage errors are
/// reported as [`HarvestError::ChangeDetection`] for this record only.
///
/// # Arguments
///
/// * `store` - The record store
/// * `record` - The freshly extracted record
///
/// # Returns
///
/// * `Ok(Detection)` - What was found and written
/// * `Err(HarvestError)` - A storage operation failed
pub fn detect_changes<S: Store + ?Sized>(
    store: &mut S,
    record: Record,
) -> Result<Detection, HarvestError> {
    let url = record.source_url.clone();
    detect_inner(store, record).map_err(|source| HarvestError::ChangeDetection { url, source })
}

fn detect_inner<S: Store + ?Sized>(store: &mut S, mut record: Record) -> StorageResult<Detection> {
    record.refresh_fingerprint();
    let now = Utc::now();

    let Some(StoredRecord { id, record: stored }) = store.find_by_key(&record.source_url)? else {
        record.first_seen_at = now;
        record.last_seen_at = now;

        // record_id is filled in by the store once the row exists
        let mut events = vec![ChangeEvent::new(
            &record.source_url,
            0,
            ChangeKind::NewRecord,
            None,
            Some(record.name.clone()),
            now,
        )];
        let record_id = store.apply_detection(&record, &mut events)?;

        return Ok(Detection {
            is_new: true,
            record_id,
            events,
            written: true,
        });
    };

    if stored.fingerprint == record.fingerprint {
        debug!("Unchanged: {}", record.source_url);
        return Ok(Detection::unchanged(id));
    }

    let mut events = diff_records(&stored, &record, id, now);
    if events.is_empty() {
        // stored values remain the comparison baseline
        debug!(
            "Fingerprint changed without tracked field changes: {}",
            record.source_url
        );
        return Ok(Detection::unchanged(id));
    }

    record.first_seen_at = stored.first_seen_at;
    record.last_seen_at = now;
    let record_id = store.apply_detection(&record, &mut events)?;

    Ok(Detection {
        is_new: false,
        record_id,
        events,
        written: true,
    })
}

/// Compares two versions of a record field by field
///
/// Events come out in a fixed order: price, availability, description,
/// rating, reviews. Only fields that differ produce an event.
pub fn diff_records(
    old: &Record,
    new: &Record,
    record_id: i64,
    at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut push = |kind: ChangeKind, old_value: Option<String>, new_value: Option<String>| {
        events.push(ChangeEvent::new(
            &new.source_url,
            record_id,
            kind,
            old_value,
            new_value,
            at,
        ));
    };

    if (old.price_gross - new.price_gross).abs() > PRICE_THRESHOLD {
        push(
            ChangeKind::Price,
            Some(format!("{:.2}", old.price_gross)),
            Some(format!("{:.2}", new.price_gross)),
        );
    }

    if old.availability != new.availability {
        push(
            ChangeKind::Availability,
            Some(old.availability.clone()),
            Some(new.availability.clone()),
        );
    }

    if old.description != new.description {
        push(
            ChangeKind::Description,
            Some(DESCRIPTION_MARKER.to_string()),
            Some(DESCRIPTION_MARKER.to_string()),
        );
    }

    if old.rating != new.rating {
        push(
            ChangeKind::Rating,
            old.rating.map(rating_value),
            new.rating.map(rating_value),
        );
    }

    if old.review_count != new.review_count {
        push(
            ChangeKind::Reviews,
            Some(old.review_count.to_string()),
            Some(new.review_count.to_string()),
        );
    }

    events
}

fn rating_value(rating: Rating) -> String {
    rating.as_str().to_string()
}

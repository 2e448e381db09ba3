//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{ChangeEvent, ChangeKind, Record};
use crate::storage::{RunCounts, RunRecord, RunStatus, StoredRecord, TimeRange};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The store owns uniqueness of `source_url`: `upsert` of a key that already
/// exists updates the existing row and returns its unchanged identity.
pub trait Store {
    // ===== Records =====

    /// Looks up the stored record for a natural key
    fn find_by_key(&self, source_url: &str) -> StorageResult<Option<StoredRecord>>;

    /// Inserts or updates a record by `source_url`
    ///
    /// # Returns
    ///
    /// The record ID (newly assigned or existing)
    fn upsert(&mut self, record: &Record) -> StorageResult<i64>;

    /// Returns every `source_url` currently stored
    fn list_all_keys(&self) -> StorageResult<HashSet<String>>;

    // ===== Change Events =====

    /// Appends one event to the change log
    fn append_change_event(&mut self, event: &ChangeEvent) -> StorageResult<()>;

    /// Writes a record and the events detected for it as one unit
    ///
    /// Either the record and every event are stored, or nothing is. Each
    /// event's `record_id` is set to the stored identity before it is
    /// written, so events for a brand-new record can be built before the
    /// record has an id.
    ///
    /// # Returns
    ///
    /// The record ID (newly assigned or existing)
    fn apply_detection(&mut self, record: &Record, events: &mut [ChangeEvent])
        -> StorageResult<i64>;

    /// Returns events inside `range`, oldest first, optionally limited to one kind
    fn query_change_events(
        &self,
        range: &TimeRange,
        kind: Option<ChangeKind>,
    ) -> StorageResult<Vec<ChangeEvent>>;

    // ===== Run Management =====

    /// Creates a new harvest run and returns its ID
    fn create_run(&mut self, config_hash: &str, resume: bool) -> StorageResult<i64>;

    /// Marks a run as finished with its final counts
    fn finish_run(&mut self, run_id: i64, status: RunStatus, counts: RunCounts)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts every logged change event by kind
    fn count_change_events_by_kind(&self) -> StorageResult<HashMap<ChangeKind, u64>>;

    /// Counts records by category
    fn count_records_by_category(&self) -> StorageResult<Vec<(String, u64)>>;
}

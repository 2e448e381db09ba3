//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::model::{
    format_timestamp, parse_timestamp, ChangeEvent, ChangeKind, Rating, Record, RecordStatus,
};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{RunCounts, RunRecord, RunStatus, StoredRecord, TimeRange};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const RECORD_COLUMNS: &str = "id, source_url, name, description, category, price_gross, price_net,
     availability, review_count, image_url, rating, fingerprint, status, snapshot,
     first_seen_at, last_seen_at";

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, resume, status, attempted, succeeded, failed";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn upsert_record(conn: &Connection, record: &Record) -> rusqlite::Result<i64> {
    // first_seen_at is never updated
    conn.query_row(
        "INSERT INTO records (source_url, name, description, category, price_gross, price_net,
         availability, review_count, image_url, rating, fingerprint, status, snapshot,
         first_seen_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(source_url) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            category = excluded.category,
            price_gross = excluded.price_gross,
            price_net = excluded.price_net,
            availability = excluded.availability,
            review_count = excluded.review_count,
            image_url = excluded.image_url,
            rating = excluded.rating,
            fingerprint = excluded.fingerprint,
            status = excluded.status,
            snapshot = excluded.snapshot,
            last_seen_at = excluded.last_seen_at
         RETURNING id",
        params![
            record.source_url,
            record.name,
            record.description,
            record.category,
            record.price_gross,
            record.price_net,
            record.availability,
            record.review_count,
            record.image_url,
            record.rating.map(|r| r.as_str()),
            record.fingerprint,
            record.status.to_db_string(),
            record.snapshot,
            format_timestamp(&record.first_seen_at),
            format_timestamp(&record.last_seen_at),
        ],
        |row| row.get(0),
    )
}

fn insert_change_event(conn: &Connection, event: &ChangeEvent) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO change_events (record_id, record_key, kind, old_value, new_value, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.record_id,
            event.record_key,
            event.kind.to_db_string(),
            event.old_value,
            event.new_value,
            format_timestamp(&event.occurred_at),
        ],
    )?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let rating: Option<String> = row.get(10)?;
    let status: String = row.get(12)?;
    let first_seen: String = row.get(14)?;
    let last_seen: String = row.get(15)?;

    Ok(StoredRecord {
        id: row.get(0)?,
        record: Record {
            source_url: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            price_gross: row.get(5)?,
            price_net: row.get(6)?,
            availability: row.get(7)?,
            review_count: row.get(8)?,
            image_url: row.get(9)?,
            rating: rating.as_deref().and_then(Rating::from_class_token),
            fingerprint: row.get(11)?,
            status: RecordStatus::from_db_string(&status).unwrap_or(RecordStatus::Active),
            snapshot: row.get(13)?,
            first_seen_at: parse_timestamp(&first_seen).unwrap_or_else(Utc::now),
            last_seen_at: parse_timestamp(&last_seen).unwrap_or_else(Utc::now),
        },
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        resume: row.get::<_, i64>(4)? != 0,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Running),
        attempted: row.get::<_, i64>(6)? as u64,
        succeeded: row.get::<_, i64>(7)? as u64,
        failed: row.get::<_, i64>(8)? as u64,
    })
}

impl Store for SqliteStore {
    // ===== Records =====

    fn find_by_key(&self, source_url: &str) -> StorageResult<Option<StoredRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM records WHERE source_url = ?1",
            RECORD_COLUMNS
        ))?;

        let record = stmt
            .query_row(params![source_url], record_from_row)
            .optional()?;

        Ok(record)
    }

    fn upsert(&mut self, record: &Record) -> StorageResult<i64> {
        Ok(upsert_record(&self.conn, record)?)
    }

    fn list_all_keys(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT source_url FROM records")?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(keys)
    }

    // ===== Change Events =====

    fn append_change_event(&mut self, event: &ChangeEvent) -> StorageResult<()> {
        insert_change_event(&self.conn, event)?;
        Ok(())
    }

    fn apply_detection(&mut self, record: &Record, events: &mut [ChangeEvent]) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;

        let id = upsert_record(&tx, record)?;
        for event in events.iter_mut() {
            event.record_id = id;
            insert_change_event(&tx, event)?;
        }

        tx.commit()?;
        Ok(id)
    }

    fn query_change_events(
        &self,
        range: &TimeRange,
        kind: Option<ChangeKind>,
    ) -> StorageResult<Vec<ChangeEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, record_key, kind, old_value, new_value, occurred_at
             FROM change_events
             WHERE occurred_at >= ?1 AND occurred_at < ?2 AND (?3 IS NULL OR kind = ?3)
             ORDER BY occurred_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(
            params![
                format_timestamp(&range.start),
                format_timestamp(&range.end),
                kind.map(|k| k.to_db_string()),
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut events = Vec::new();
        for row in rows {
            let (record_id, record_key, kind_str, old_value, new_value, occurred_str) = row?;
            let kind = ChangeKind::from_db_string(&kind_str)
                .ok_or_else(|| StorageError::CorruptRow(format!("unknown change kind '{}'", kind_str)))?;
            let occurred_at = parse_timestamp(&occurred_str).ok_or_else(|| {
                StorageError::CorruptRow(format!("bad timestamp '{}'", occurred_str))
            })?;
            events.push(ChangeEvent {
                record_key,
                record_id,
                kind,
                old_value,
                new_value,
                occurred_at,
            });
        }

        Ok(events)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, resume: bool) -> StorageResult<i64> {
        let now = format_timestamp(&Utc::now());
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, resume, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, resume as i64, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counts: RunCounts,
    ) -> StorageResult<()> {
        let now = format_timestamp(&Utc::now());
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, attempted = ?3, succeeded = ?4, failed = ?5
             WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                counts.attempted as i64,
                counts.succeeded as i64,
                counts.failed as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

        stmt.query_row(params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;

        let run = stmt.query_row([], run_from_row).optional()?;

        Ok(run)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_change_events_by_kind(&self) -> StorageResult<HashMap<ChangeKind, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM change_events GROUP BY kind")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (kind_str, count) = row?;
            if let Some(kind) = ChangeKind::from_db_string(&kind_str) {
                counts.insert(kind, count as u64);
            }
        }

        Ok(counts)
    }

    fn count_records_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) as count FROM records GROUP BY category
             ORDER BY count DESC, category ASC",
        )?;

        let categories = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }
}

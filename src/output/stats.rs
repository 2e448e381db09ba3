//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! store statistics.

use crate::model::ChangeKind;
use crate::storage::{RunRecord, StorageResult, Store};
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Record count per category, largest first
    pub records_by_category: Vec<(String, u64)>,

    /// Change events ever logged, by kind
    pub events_by_kind: HashMap<ChangeKind, u64>,

    /// Most recent harvest run
    pub latest_run: Option<RunRecord>,
}

impl HarvestStatistics {
    pub fn total_events(&self) -> u64 {
        self.events_by_kind.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn Store) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        total_records: store.count_records()?,
        records_by_category: store.count_records_by_category()?,
        events_by_kind: store.count_change_events_by_kind()?,
        latest_run: store.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Records stored: {}", stats.total_records);
    println!("  Change events logged: {}", stats.total_events());
    println!();

    if !stats.records_by_category.is_empty() {
        println!("Records by Category:");
        for (category, count) in &stats.records_by_category {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            let label = if category.is_empty() {
                "(none)"
            } else {
                category.as_str()
            };
            println!("  {}: {} ({:.1}%)", label, count, percentage);
        }
        println!();
    }

    println!("Change Events by Kind:");
    for kind in ChangeKind::all() {
        let count = stats.events_by_kind.get(&kind).copied().unwrap_or(0);
        println!("  {}: {}", kind, count);
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run #{}:", run.id);
            println!("  Started: {}", run.started_at);
            println!(
                "  Finished: {}",
                run.finished_at.as_deref().unwrap_or("(not finished)")
            );
            println!("  Status: {}", run.status.to_db_string());
            println!("  Resume: {}", run.resume);
            println!(
                "  Units: {} attempted, {} succeeded, {} failed",
                run.attempted, run.succeeded, run.failed
            );
        }
        None => println!("No harvest runs recorded yet."),
    }
}

//! Output module for change reports and statistics
//!
//! This module handles:
//! - Collecting the change events of a time window into a report
//! - Writing reports as JSON or CSV files
//! - Printing store statistics

mod csv;
mod json;
mod report;
pub mod stats;

pub use self::csv::render_csv;
pub use json::render_json;
pub use report::{ChangeReport, ReportSummary};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::config::ReportFormat;
use crate::storage::{StorageError, Store, TimeRange};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building or writing reports
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Builds the change report for a time window
///
/// # Arguments
///
/// * `store` - The store holding the change log
/// * `window` - Half-open window `[start, end)`
///
/// # Returns
///
/// * `Ok(ChangeReport)` - Events in the window, oldest first, with counts
/// * `Err(OutputError)` - The change log could not be queried
pub fn build_report(store: &dyn Store, window: TimeRange) -> Result<ChangeReport, OutputError> {
    let events = store.query_change_events(&window, None)?;
    Ok(ChangeReport::new(window, events))
}

/// File name of the report for a window, e.g. `changes_report_2024-03-10.json`
pub fn report_file_name(report: &ChangeReport, format: ReportFormat) -> String {
    format!(
        "changes_report_{}.{}",
        report.window_start.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Writes a report into `dir`, creating the directory if needed
///
/// # Returns
///
/// The path of the written file
pub fn write_report(
    report: &ChangeReport,
    dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf, OutputError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(report, format));

    let bytes = match format {
        ReportFormat::Json => render_json(report)?.into_bytes(),
        ReportFormat::Csv => render_csv(report)?,
    };
    std::fs::write(&path, bytes)?;

    tracing::info!(
        "Wrote {} change(s) to {}",
        report.summary.total,
        path.display()
    );
    Ok(path)
}

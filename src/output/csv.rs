use crate::model::format_timestamp;
use crate::output::report::ChangeReport;
use crate::output::OutputError;

const HEADER: [&str; 6] = [
    "occurred_at",
    "kind",
    "record_id",
    "record_key",
    "old_value",
    "new_value",
];

/// Renders a report as CSV, one row per event
///
/// The header row is always written, so an empty window yields a
/// header-only file.
pub fn render_csv(report: &ChangeReport) -> Result<Vec<u8>, OutputError> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for event in &report.events {
        writer.write_record([
            format_timestamp(&event.occurred_at),
            event.kind.to_db_string().to_string(),
            event.record_id.to_string(),
            event.record_key.clone(),
            event.old_value.clone().unwrap_or_default(),
            event.new_value.clone().unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| OutputError::Io(e.into_error()))
}

use crate::output::report::ChangeReport;
use crate::output::OutputError;

/// Renders a report as pretty-printed JSON
pub fn render_json(report: &ChangeReport) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(report)?)
}

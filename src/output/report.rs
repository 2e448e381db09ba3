use crate::model::{ChangeEvent, ChangeKind};
use crate::storage::TimeRange;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Change events of one time window plus their per-kind counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub summary: ReportSummary,
    pub events: Vec<ChangeEvent>,
}

/// Totals for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,

    /// Every kind is present, with zero when it did not occur
    pub by_kind: BTreeMap<ChangeKind, usize>,
}

impl ReportSummary {
    pub fn from_events(events: &[ChangeEvent]) -> Self {
        let mut by_kind: BTreeMap<ChangeKind, usize> =
            ChangeKind::all().into_iter().map(|k| (k, 0)).collect();
        for event in events {
            *by_kind.entry(event.kind).or_insert(0) += 1;
        }
        Self {
            total: events.len(),
            by_kind,
        }
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

impl ChangeReport {
    pub fn new(window: TimeRange, events: Vec<ChangeEvent>) -> Self {
        Self {
            window_start: window.start,
            window_end: window.end,
            summary: ReportSummary::from_events(&events),
            events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

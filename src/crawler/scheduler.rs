//! Daily harvest scheduling
//!
//! The scheduler is a timer around `Orchestrator::run(resume = true)`. After
//! each run it writes a change report for the run's window and raises an
//! alert in the log when any change was recorded.

use crate::config::{Config, ReportFormat};
use crate::crawler::orchestrator::{CrawlSummary, Orchestrator};
use crate::output::{build_report, write_report, ChangeReport};
use crate::storage::{StorageError, Store, TimeRange};
use crate::Result;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// A fixed hour of the day in a fixed time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub hour: u32,
    pub tz: Tz,
}

impl DailySchedule {
    pub fn new(hour: u32, tz: Tz) -> Self {
        Self { hour, tz }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.schedule.daily_hour, config.timezone()?))
    }

    /// The first scheduled instant strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.with_timezone(&self.tz).date_naive();

        for _ in 0..3 {
            if let Some(candidate) = self.on_date(date) {
                if candidate > now {
                    return candidate;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        now + Duration::days(1)
    }

    /// The scheduled instant on a local calendar date
    ///
    /// An hour skipped by a DST jump resolves to the first valid hour after
    /// it; a repeated hour resolves to its first occurrence.
    fn on_date(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local = date.and_hms_opt(self.hour, 0, 0)?;
        let resolved = match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => self
                .tz
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()?,
        };
        Some(resolved.with_timezone(&Utc))
    }
}

/// What one scheduled run produced
#[derive(Debug, Clone)]
pub struct ScheduledRun {
    pub summary: CrawlSummary,
    pub report: ChangeReport,

    /// None when the report file could not be written
    pub report_path: Option<PathBuf>,
}

impl ScheduledRun {
    /// Change volume of the run, the alert signal
    pub fn changes(&self) -> usize {
        self.report.summary.total
    }
}

/// Runs the orchestrator once per day
pub struct Scheduler<S: Store + Send + 'static> {
    orchestrator: Orchestrator<S>,
    schedule: DailySchedule,
    report_dir: PathBuf,
    report_format: ReportFormat,
}

impl<S: Store + Send + 'static> Scheduler<S> {
    /// Creates a scheduler from the orchestrator's configuration
    pub fn new(orchestrator: Orchestrator<S>) -> Result<Self> {
        let config = orchestrator.config();
        let schedule = DailySchedule::from_config(config)?;
        let report_dir = config.output.report_dir();
        let report_format = config.output.report_format;

        Ok(Self {
            orchestrator,
            schedule,
            report_dir,
            report_format,
        })
    }

    pub fn schedule(&self) -> &DailySchedule {
        &self.schedule
    }

    /// Runs one resumable harvest, then reports on it
    pub async fn run_once(&self) -> Result<ScheduledRun> {
        let started = Utc::now();
        let summary = self.orchestrator.run(true).await?;
        let window = TimeRange::new(started, Utc::now() + Duration::microseconds(1));

        let report = {
            let store = self.orchestrator.store();
            let guard = store.lock().map_err(|_| StorageError::LockPoisoned)?;
            build_report(&*guard, window)?
        };

        let report_path = match write_report(&report, &self.report_dir, self.report_format) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Failed to write change report: {}", e);
                None
            }
        };

        let run = ScheduledRun {
            summary,
            report,
            report_path,
        };

        if run.changes() > 0 {
            warn!(
                "ALERT: {} changes detected in run {}",
                run.changes(),
                run.summary.run_id
            );
        } else {
            info!("No changes detected in run {}", run.summary.run_id);
        }

        Ok(run)
    }

    /// Runs daily until `shutdown` resolves
    ///
    /// Shutdown is only observed while waiting for the next slot; a run in
    /// progress always finishes. A failed run is logged and the loop moves
    /// on to the next day.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = Utc::now();
            let next = self.schedule.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(
                "Next harvest at {} ({})",
                next.with_timezone(&self.schedule.tz),
                next
            );

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.run_once().await {
                error!("Scheduled harvest failed: {}", e);
            }
        }
    }
}

//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest catalog harvester.

use anyhow::{anyhow, Context};
use catalog_harvest::config::{load_config_with_hash, Config, ReportFormat};
use catalog_harvest::crawler::{DailySchedule, Orchestrator, Scheduler};
use catalog_harvest::output::{build_report, load_statistics, print_statistics, write_report};
use catalog_harvest::storage::{open_store, SqliteStore, TimeRange};
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a scheduled catalog harvester with change tracking
///
/// Catalog-Harvest walks a paginated catalog site, stores one record per
/// detail page and logs every new record and field-level change it sees
/// between runs.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A scheduled catalog harvester with change tracking", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Re-verify every record instead of skipping already stored ones
    #[arg(long, conflicts_with_all = ["schedule", "stats", "report", "dry_run"])]
    fresh: bool,

    /// Run daily at the configured hour until interrupted
    #[arg(long, conflicts_with_all = ["stats", "report", "dry_run"])]
    schedule: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["report", "dry_run"])]
    stats: bool,

    /// Write a change report for one UTC day and exit
    #[arg(long, conflicts_with = "dry_run")]
    report: bool,

    /// Report day as YYYY-MM-DD (defaults to yesterday)
    #[arg(long, requires = "report", value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Report format, json or csv (defaults to the configured format)
    #[arg(long, requires = "report", value_parser = parse_format)]
    format: Option<ReportFormat>,

    /// Validate config and show what would be harvested without harvesting
    #[arg(long)]
    dry_run: bool,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn parse_format(s: &str) -> Result<ReportFormat, String> {
    ReportFormat::from_name(s).ok_or_else(|| format!("unknown report format '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.report {
        handle_report(&config, cli.date, cli.format)
    } else if cli.schedule {
        handle_schedule(config, config_hash).await
    } else {
        handle_harvest(config, config_hash, !cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStore> {
    let path = Path::new(&config.output.database_path);
    open_store(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Catalog root: {}", config.catalog_root_url()?);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Retry base delay: {}ms", config.crawler.retry_base_delay_ms);
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Max catalog pages: {}", config.crawler.max_catalog_pages);
    println!(
        "  Snapshot limit: {} bytes",
        config.crawler.snapshot_max_bytes
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent_string());

    let schedule = DailySchedule::from_config(config)?;
    println!("\nSchedule:");
    println!(
        "  Daily at {:02}:00 {}",
        config.schedule.daily_hour, config.schedule.timezone
    );
    println!(
        "  Next run: {}",
        schedule
            .next_run_after(Utc::now())
            .with_timezone(&schedule.tz)
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Reports: {}", config.output.report_dir);
    println!("  Report format: {}", config.output.report_format.extension());

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_database(config)?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --report mode: writes the change report for one day
fn handle_report(
    config: &Config,
    date: Option<NaiveDate>,
    format: Option<ReportFormat>,
) -> anyhow::Result<()> {
    let date = date.unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive());
    let format = format.unwrap_or(config.output.report_format);

    let store = open_database(config)?;
    let report = build_report(&store, TimeRange::day(date))?;
    let path = write_report(&report, &config.output.report_dir(), format)?;

    println!(
        "✓ {} change(s) on {} written to {}",
        report.summary.total,
        date,
        path.display()
    );

    Ok(())
}

/// Handles a single harvest run
async fn handle_harvest(config: Config, config_hash: String, resume: bool) -> anyhow::Result<()> {
    if resume {
        tracing::info!("Starting harvest (skipping already stored records)");
    } else {
        tracing::info!("Starting fresh harvest (re-verifying every record)");
    }

    let store = open_database(&config)?;
    let orchestrator = Orchestrator::new(config, store)?.with_config_hash(config_hash);

    let summary = orchestrator
        .run(resume)
        .await
        .map_err(|e| anyhow!("harvest failed: {}", e))?;

    println!(
        "✓ Run {}: {} attempted, {} succeeded, {} failed ({} new, {} updated, {} change events)",
        summary.run_id,
        summary.attempted,
        summary.succeeded,
        summary.failed,
        summary.new_records,
        summary.updated_records,
        summary.events_emitted
    );
    if !summary.discovery_complete {
        println!("! Discovery stopped early; some catalog pages were not walked");
    }

    Ok(())
}

/// Handles the --schedule mode: runs daily until Ctrl-C
async fn handle_schedule(config: Config, config_hash: String) -> anyhow::Result<()> {
    let store = open_database(&config)?;
    let orchestrator = Orchestrator::new(config, store)?.with_config_hash(config_hash);
    let scheduler = Scheduler::new(orchestrator)?;

    tracing::info!(
        "Scheduler started: daily at {:02}:00 {}",
        scheduler.schedule().hour,
        scheduler.schedule().tz
    );

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

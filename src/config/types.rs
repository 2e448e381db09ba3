use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Absolute URL of the first catalog listing page
    pub fn catalog_root_url(&self) -> Result<Url, ConfigError> {
        let base = self.base_url()?;
        base.join(&self.crawler.start_path).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid start-path '{}': {}",
                self.crawler.start_path, e
            ))
        })
    }

    /// Base URL with a trailing slash, so relative joins stay under it
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.crawler.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", raw, e)))
    }

    /// Time zone the daily schedule is expressed in
    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.schedule
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(self.schedule.timezone.clone()))
    }

    /// User-Agent header sent with every request
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.user_agent.crawler_name,
            self.user_agent.crawler_version,
            self.user_agent.contact_url,
            self.user_agent.contact_email
        )
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Root of the catalog site
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// First listing page, relative to `base_url`
    #[serde(rename = "start-path", default = "default_start_path")]
    pub start_path: String,

    /// Retries after the first attempt of a fetch
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base in milliseconds, doubled on each retry
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Size of the permit pool shared by every outbound request
    #[serde(
        rename = "max-concurrent-requests",
        default = "default_max_concurrent_requests"
    )]
    pub max_concurrent_requests: u32,

    /// Pagination ceiling for discovery
    #[serde(rename = "max-catalog-pages", default = "default_max_catalog_pages")]
    pub max_catalog_pages: u32,

    /// Snapshots larger than this are not stored
    #[serde(rename = "snapshot-max-bytes", default = "default_snapshot_max_bytes")]
    pub snapshot_max_bytes: usize,
}

impl CrawlerConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://books.toscrape.com".to_string()
}

fn default_start_path() -> String {
    "index.html".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_requests() -> u32 {
    10
}

fn default_max_catalog_pages() -> u32 {
    1000
}

fn default_snapshot_max_bytes() -> usize {
    1_000_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Daily schedule configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Local hour (0-23) at which the daily run starts
    #[serde(rename = "daily-hour", default = "default_daily_hour")]
    pub daily_hour: u32,

    /// IANA time zone name, e.g. "Europe/London"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_hour: default_daily_hour(),
            timezone: default_timezone(),
        }
    }
}

fn default_daily_hour() -> u32 {
    2
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory change reports are written to
    #[serde(rename = "report-dir", default = "default_report_dir")]
    pub report_dir: String,

    #[serde(rename = "report-format", default)]
    pub report_format: ReportFormat,
}

impl OutputConfig {
    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.report_dir)
    }
}

fn default_report_dir() -> String {
    "./reports".to_string()
}

/// File format of a change report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

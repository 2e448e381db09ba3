//! Catalog-Harvest: a scheduled catalog harvester with change tracking
//!
//! This crate walks a paginated catalog site, extracts one record per detail
//! page, fingerprints the mutable fields of each record and keeps both the
//! current record set and an append-only history of detected changes.

pub mod config;
pub mod crawler;
pub mod detect;
pub mod model;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extraction failed for {url}: {source}")]
    Extraction {
        url: String,
        source: crawler::ExtractError,
    },

    #[error("Change detection failed for {url}: {source}")]
    ChangeDetection {
        url: String,
        source: storage::StorageError,
    },

    #[error("Discovery stopped at {url}: {source}")]
    Discovery {
        url: String,
        source: crawler::FetchError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSummary, Orchestrator};
pub use model::{ChangeEvent, ChangeKind, Rating, Record, RecordStatus};
pub use state::CrawlState;

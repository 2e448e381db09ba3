//! Crawler module for catalog harvesting
//!
//! This module contains the harvest pipeline, including:
//! - HTTP transport and fetching with retry and backoff
//! - Listing and detail page extraction
//! - Run orchestration with resume support
//! - Daily scheduling

mod extractor;
mod fetcher;
mod orchestrator;
mod retry;
mod scheduler;
mod transport;

pub use extractor::{extract_listing, extract_record, ExtractError, Listing, UNKNOWN_AVAILABILITY};
pub use fetcher::{FetchError, FetchFailure, FetchedPage, Fetcher};
pub use orchestrator::{CrawlSummary, Orchestrator};
pub use retry::RetryPolicy;
pub use scheduler::{DailySchedule, ScheduledRun, Scheduler};
pub use transport::{
    build_http_client, HttpTransport, Transport, TransportError, TransportResponse, MAX_REDIRECTS,
};

//! HTTP fetcher implementation
//!
//! This module wraps a [`Transport`] with:
//! - A global permit pool shared by every outbound request
//! - Bounded retries with exponential backoff
//! - Error classification for terminal failures

use crate::config::Config;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::transport::{Transport, TransportError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,

    /// Page body, decoded lossily as UTF-8
    pub body: String,
}

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Transport(TransportError),
    Status(u16),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Status(code) => write!(f, "HTTP {}", code),
        }
    }
}

/// Terminal fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url}: giving up after {attempts} attempts, last failure: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: FetchFailure,
    },

    #[error("request permit pool closed")]
    PoolClosed,
}

/// Fetches pages through a shared permit pool with retry and backoff
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Creates a fetcher
    ///
    /// # Arguments
    ///
    /// * `transport` - The underlying HTTP transport
    /// * `max_concurrent` - Number of requests allowed in flight at once
    /// * `policy` - Retry policy applied to every URL
    pub fn new(transport: Arc<dyn Transport>, max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let policy = RetryPolicy::new(
            config.crawler.max_retries,
            config.crawler.retry_base_delay(),
        );
        Self::new(
            transport,
            config.crawler.max_concurrent_requests as usize,
            policy,
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Permits currently free in the pool
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fetches a URL, retrying transient failures
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch_from(url, 0).await
    }

    /// Fetches a URL starting at the given attempt number
    ///
    /// A permit is held only while a request is in flight. It is released
    /// before any backoff sleep so waiting retries do not starve other work.
    pub async fn fetch_from(&self, url: &str, start_attempt: u32) -> Result<FetchedPage, FetchError> {
        let mut attempt = start_attempt;

        loop {
            let outcome = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| FetchError::PoolClosed)?;
                self.transport.get(url).await
            };

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    return Ok(FetchedPage {
                        final_url: response.final_url,
                        body: String::from_utf8_lossy(&response.body).into_owned(),
                    });
                }
                Ok(response) => FetchFailure::Status(response.status),
                Err(e) => FetchFailure::Transport(e),
            };

            if !self.policy.should_retry(attempt) {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt - start_attempt + 1,
                    last: failure,
                });
            }

            let delay = self.policy.delay_for(attempt);
            debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt + 1,
                url,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

//! Harvest orchestration
//!
//! One `run` walks the catalog in four phases:
//! - Discovery: follow listing pages in order, collecting detail URLs
//! - Resume filtering: skip URLs already in the store when resuming
//! - Fan-out: fetch, extract and detect every pending URL concurrently
//! - Aggregation: count outcomes and close the run row

use crate::config::Config;
use crate::crawler::extractor::{extract_listing, extract_record};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::transport::{HttpTransport, Transport};
use crate::detect::{detect_changes, Detection};
use crate::state::CrawlState;
use crate::storage::{RunCounts, RunStatus, StorageError, Store};
use crate::{HarvestError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

/// Outcome counts of one harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub run_id: i64,

    /// Listing pages fetched during discovery
    pub pages_walked: usize,

    /// Distinct detail URLs found during discovery
    pub discovered: usize,

    /// Units of work launched after resume filtering
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,

    pub new_records: usize,

    /// Existing records whose stored values were overwritten
    pub updated_records: usize,
    pub events_emitted: usize,

    /// False when discovery stopped early on a fetch failure or the page ceiling
    pub discovery_complete: bool,
}

impl CrawlSummary {
    /// Number of change events that signal a modification or addition
    pub fn changes(&self) -> usize {
        self.events_emitted
    }
}

/// Result of walking the listing pages
#[derive(Debug, Default)]
struct DiscoveryOutcome {
    detail_urls: Vec<String>,
    pages_walked: usize,
    complete: bool,
}

/// Main harvest orchestrator
pub struct Orchestrator<S: Store + Send + 'static> {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    store: Arc<Mutex<S>>,
    config_hash: String,
}

impl<S: Store + Send + 'static> Orchestrator<S> {
    /// Creates an orchestrator that talks HTTP through reqwest
    ///
    /// # Arguments
    ///
    /// * `config` - The harvester configuration
    /// * `store` - The record store
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(HarvestError)` - The HTTP client could not be built
    pub fn new(config: Config, store: S) -> Result<Self> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(config, store, Arc::new(transport)))
    }

    /// Creates an orchestrator over an arbitrary transport
    pub fn with_transport(config: Config, store: S, transport: Arc<dyn Transport>) -> Self {
        let fetcher = Fetcher::from_config(&config, transport);
        Self {
            config: Arc::new(config),
            fetcher: Arc::new(fetcher),
            store: Arc::new(Mutex::new(store)),
            config_hash: String::new(),
        }
    }

    /// Sets the configuration hash recorded on each run row
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the store
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    fn lock_store(&self) -> std::result::Result<MutexGuard<'_, S>, StorageError> {
        self.store.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs one complete harvest
    ///
    /// Per-URL failures are logged and counted, never returned. Only a store
    /// that cannot be read or written at the start or end of the run makes
    /// the whole run fail.
    ///
    /// # Arguments
    ///
    /// * `resume` - Skip detail pages whose URL is already stored
    pub async fn run(&self, resume: bool) -> Result<CrawlSummary> {
        let root = self.config.catalog_root_url()?;
        let (known, run_id) = {
            let mut store = self.lock_store()?;
            let known = store.list_all_keys()?;
            let run_id = store.create_run(&self.config_hash, resume)?;
            (known, run_id)
        };

        info!(
            "Starting harvest run {} (resume={}, {} known records)",
            run_id,
            resume,
            known.len()
        );

        let mut summary = CrawlSummary {
            run_id,
            ..CrawlSummary::default()
        };

        let discovery = self.discover(root).await;
        summary.pages_walked = discovery.pages_walked;
        summary.discovery_complete = discovery.complete;

        let mut state = CrawlState::new(known);
        let unique: HashSet<&String> = discovery.detail_urls.iter().collect();
        summary.discovered = unique.len();

        let pending = state.filter_pending(&discovery.detail_urls, resume);
        info!(
            "Discovered {} detail URLs on {} listing pages, {} to process",
            summary.discovered,
            summary.pages_walked,
            pending.len()
        );

        summary.attempted = pending.len();
        self.fan_out(pending, &mut summary).await;

        let counts = RunCounts {
            attempted: summary.attempted as u64,
            succeeded: summary.succeeded as u64,
            failed: summary.failed as u64,
        };
        self.lock_store()?
            .finish_run(run_id, RunStatus::Completed, counts)?;

        info!(
            "Harvest run {} finished: {} attempted, {} succeeded, {} failed, {} new, {} updated, {} events",
            run_id,
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.new_records,
            summary.updated_records,
            summary.events_emitted
        );

        Ok(summary)
    }

    /// Walks listing pages from the catalog root in order
    async fn discover(&self, root: Url) -> DiscoveryOutcome {
        let max_pages = self.config.crawler.max_catalog_pages as usize;
        let mut outcome = DiscoveryOutcome::default();
        let mut walked: HashSet<String> = HashSet::new();
        let mut next = Some(root.to_string());

        while let Some(page_url) = next.take() {
            if outcome.pages_walked >= max_pages {
                warn!(
                    "Stopping discovery at the {} page ceiling, next was {}",
                    max_pages, page_url
                );
                return outcome;
            }

            if !walked.insert(page_url.clone()) {
                warn!("Listing page {} already walked, ending discovery", page_url);
                break;
            }

            let page = match self.fetcher.fetch(&page_url).await {
                Ok(page) => page,
                Err(source) => {
                    let err = HarvestError::Discovery {
                        url: page_url,
                        source,
                    };
                    warn!("{}", err);
                    return outcome;
                }
            };
            outcome.pages_walked += 1;

            let base = Url::parse(&page.final_url)
                .or_else(|_| Url::parse(&page_url))
                .unwrap_or_else(|_| root.clone());
            let listing = extract_listing(&page.body, &base);
            debug!(
                "Listing {} yielded {} detail URLs",
                page_url,
                listing.detail_urls.len()
            );

            outcome.detail_urls.extend(listing.detail_urls);
            next = listing.next_page;
        }

        outcome.complete = true;
        outcome
    }

    /// Runs one unit of work per URL and folds the results into `summary`
    async fn fan_out(&self, pending: Vec<String>, summary: &mut CrawlSummary) {
        let snapshot_max = self.config.crawler.snapshot_max_bytes;
        let mut units = JoinSet::new();

        for url in pending {
            let fetcher = Arc::clone(&self.fetcher);
            let store = Arc::clone(&self.store);
            units.spawn(process_url(fetcher, store, url, snapshot_max));
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Ok(detection)) => {
                    summary.succeeded += 1;
                    summary.events_emitted += detection.events.len();
                    if detection.is_new {
                        summary.new_records += 1;
                    } else if detection.written {
                        summary.updated_records += 1;
                    }
                }
                Ok(Err(e)) => {
                    warn!("{}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Unit of work did not complete: {}", e);
                    summary.failed += 1;
                }
            }
        }
    }
}

/// Fetch, extract and detect for one detail URL
async fn process_url<S: Store + Send>(
    fetcher: Arc<Fetcher>,
    store: Arc<Mutex<S>>,
    url: String,
    snapshot_max: usize,
) -> Result<Detection> {
    let page = fetcher.fetch(&url).await?;

    let mut record = extract_record(&page.body, &url).map_err(|source| HarvestError::Extraction {
        url: url.clone(),
        source,
    })?;

    if record.cap_snapshot(snapshot_max) {
        warn!(
            "Snapshot of {} exceeds {} bytes, storing without it",
            url, snapshot_max
        );
    }

    let detection = {
        let mut guard = store.lock().map_err(|_| HarvestError::ChangeDetection {
            url: url.clone(),
            source: StorageError::LockPoisoned,
        })?;
        detect_changes(&mut *guard, record)?
    };

    if detection.is_new {
        info!("New record: {}", url);
    } else if !detection.events.is_empty() {
        info!("Updated {}: {} change(s)", url, detection.events.len());
    }

    Ok(detection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::transport::{TransportError, TransportResponse};
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned pages by URL, 404 for anything else
    struct Pages(HashMap<String, String>);

    #[async_trait]
    impl Transport for Pages {
        async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportError> {
            Ok(match self.0.get(url) {
                Some(body) => TransportResponse {
                    status: 200,
                    final_url: url.to_string(),
                    body: body.clone().into_bytes(),
                },
                None => TransportResponse {
                    status: 404,
                    final_url: url.to_string(),
                    body: Vec::new(),
                },
            })
        }
    }

    fn config(max_pages: u32) -> Config {
        toml::from_str(&format!(
            r#"
[crawler]
base-url = "https://shop.test"
max-retries = 0
retry-base-delay-ms = 0
max-catalog-pages = {}

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = ":memory:"
"#,
            max_pages
        ))
        .unwrap()
    }

    fn listing(links: &[&str], next: Option<&str>) -> String {
        let mut html = String::from("<html><body>");
        for link in links {
            html.push_str(&format!(
                r#"<article class="product_pod"><h3><a href="{}">x</a></h3></article>"#,
                link
            ));
        }
        if let Some(next) = next {
            html.push_str(&format!(r#"<li class="next"><a href="{}">next</a></li>"#, next));
        }
        html.push_str("</body></html>");
        html
    }

    fn detail(name: &str) -> String {
        format!(
            r#"<html><body><h1>{}</h1><table><tr><th>Price (incl. tax)</th><td>£1.00</td></tr></table></body></html>"#,
            name
        )
    }

    fn orchestrator(pages: Vec<(&str, String)>, max_pages: u32) -> Orchestrator<SqliteStore> {
        let pages = pages
            .into_iter()
            .map(|(url, body)| (url.to_string(), body))
            .collect();
        Orchestrator::with_transport(
            config(max_pages),
            SqliteStore::in_memory().unwrap(),
            Arc::new(Pages(pages)),
        )
    }

    #[tokio::test]
    async fn test_listing_loop_guard() {
        let orch = orchestrator(
            vec![
                ("https://shop.test/index.html", listing(&["a.html"], Some("page-2.html"))),
                ("https://shop.test/page-2.html", listing(&["b.html"], Some("index.html"))),
                ("https://shop.test/a.html", detail("A")),
                ("https://shop.test/b.html", detail("B")),
            ],
            100,
        );

        let summary = orch.run(true).await.unwrap();
        assert_eq!(summary.pages_walked, 2);
        assert!(summary.discovery_complete);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.new_records, 2);
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_discovery() {
        let orch = orchestrator(
            vec![
                ("https://shop.test/index.html", listing(&["a.html"], Some("page-2.html"))),
                ("https://shop.test/page-2.html", listing(&["b.html"], None)),
                ("https://shop.test/a.html", detail("A")),
            ],
            1,
        );

        let summary = orch.run(true).await.unwrap();
        assert_eq!(summary.pages_walked, 1);
        assert!(!summary.discovery_complete);
        assert_eq!(summary.attempted, 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_keeps_collected_urls() {
        let orch = orchestrator(
            vec![
                ("https://shop.test/index.html", listing(&["a.html"], Some("missing.html"))),
                ("https://shop.test/a.html", detail("A")),
            ],
            100,
        );

        let summary = orch.run(true).await.unwrap();
        assert!(!summary.discovery_complete);
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_failed_units_are_counted() {
        let orch = orchestrator(
            vec![
                (
                    "https://shop.test/index.html",
                    listing(&["a.html", "gone.html", "json.html"], None),
                ),
                ("https://shop.test/a.html", detail("A")),
                ("https://shop.test/json.html", "{}".to_string()),
            ],
            100,
        );

        let summary = orch.run(false).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);

        let store = orch.store();
        let store = store.lock().unwrap();
        let run = store.get_run(summary.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.failed, 2);
        assert!(!run.resume);
    }
}

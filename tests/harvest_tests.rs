//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small catalog and run full harvests
//! against it end-to-end.

use async_trait::async_trait;
use catalog_harvest::config::{
    Config, CrawlerConfig, OutputConfig, ReportFormat, ScheduleConfig, UserAgentConfig,
};
use catalog_harvest::crawler::{
    Orchestrator, Scheduler, Transport, TransportError, TransportResponse,
};
use catalog_harvest::model::{ChangeKind, Rating};
use catalog_harvest::storage::{SqliteStore, Store, TimeRange};
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the given catalog
fn create_test_config(base_url: &str, dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            base_url: base_url.to_string(),
            start_path: "index.html".to_string(),
            max_retries: 3,
            retry_base_delay_ms: 1, // Very short for testing
            request_timeout_secs: 5,
            max_concurrent_requests: 4,
            max_catalog_pages: 50,
            snapshot_max_bytes: 1_000_000,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        schedule: ScheduleConfig::default(),
        output: OutputConfig {
            database_path: dir.join("harvest.db").display().to_string(),
            report_dir: dir.join("reports").display().to_string(),
            report_format: ReportFormat::Json,
        },
    }
}

fn listing_page(links: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><ol class=\"row\">");
    for link in links {
        html.push_str(&format!(
            r#"<li><article class="product_pod"><h3><a href="{}">book</a></h3></article></li>"#,
            link
        ));
    }
    html.push_str("</ol><ul class=\"pager\">");
    if let Some(next) = next {
        html.push_str(&format!(r#"<li class="next"><a href="{}">next</a></li>"#, next));
    }
    html.push_str("</ul></body></html>");
    html
}

fn detail_page(name: &str, price: &str, availability: &str, rating: &str) -> String {
    format!(
        r#"<html><body>
<ul class="breadcrumb"><li><a href="../../index.html">Home</a></li><li><a href="../category/poetry_23/index.html">Poetry</a></li><li class="active">{name}</li></ul>
<div id="product_gallery"><img src="../../media/cover.jpg"></div>
<h1>{name}</h1>
<p class="star-rating {rating}"></p>
<div id="product_description"><h2>Product Description</h2></div>
<p>About {name}.</p>
<table>
<tr><th>Price (excl. tax)</th><td>£{price}</td></tr>
<tr><th>Price (incl. tax)</th><td>£{price}</td></tr>
<tr><th>Availability</th><td>{availability}</td></tr>
<tr><th>Number of reviews</th><td>0</td></tr>
</table>
</body></html>"#,
        name = name,
        price = price,
        availability = availability,
        rating = rating
    )
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Two listing pages: A and B on the first, C on the second
async fn mount_catalog(server: &MockServer, price_a: &str) {
    mount_page(
        server,
        "/index.html",
        listing_page(
            &["catalogue/book-a/index.html", "catalogue/book-b/index.html"],
            Some("catalogue/page-2.html"),
        ),
    )
    .await;
    mount_page(
        server,
        "/catalogue/page-2.html",
        listing_page(&["book-c/index.html"], None),
    )
    .await;
    mount_page(
        server,
        "/catalogue/book-a/index.html",
        detail_page("Book A", price_a, "In stock (22 available)", "Three"),
    )
    .await;
    mount_page(
        server,
        "/catalogue/book-b/index.html",
        detail_page("Book B", "20.00", "In stock (3 available)", "One"),
    )
    .await;
    mount_page(
        server,
        "/catalogue/book-c/index.html",
        detail_page("Book C", "9.99", "In stock (1 available)", "Five"),
    )
    .await;
}

fn new_orchestrator(config: Config) -> Orchestrator<SqliteStore> {
    let store = SqliteStore::new(Path::new(&config.output.database_path))
        .expect("Failed to open store");
    Orchestrator::new(config, store).expect("Failed to create orchestrator")
}

fn all_events(orchestrator: &Orchestrator<SqliteStore>) -> Vec<catalog_harvest::ChangeEvent> {
    let store = orchestrator.store();
    let store = store.lock().unwrap();
    let window = TimeRange::new(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1));
    store.query_change_events(&window, None).unwrap()
}

#[tokio::test]
async fn test_full_harvest_two_listing_pages() {
    let server = MockServer::start().await;
    mount_catalog(&server, "51.77").await;
    let dir = TempDir::new().unwrap();

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    let summary = orchestrator.run(true).await.expect("Harvest failed");

    assert_eq!(summary.pages_walked, 2);
    assert!(summary.discovery_complete);
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.new_records, 3);
    assert_eq!(summary.events_emitted, 3);

    let store = orchestrator.store();
    let store = store.lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 3);

    let key = format!("{}/catalogue/book-a/index.html", server.uri());
    let stored = store.find_by_key(&key).unwrap().expect("Book A not stored");
    assert_eq!(stored.record.name, "Book A");
    assert_eq!(stored.record.category, "Poetry");
    assert_eq!(stored.record.price_gross, 51.77);
    assert_eq!(stored.record.rating, Some(Rating::Three));
    assert_eq!(stored.record.description, "About Book A.");
    assert_eq!(stored.record.image_url, format!("{}/media/cover.jpg", server.uri()));
    assert!(stored.record.snapshot.is_some());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_catalog(&server, "51.77").await;
    let dir = TempDir::new().unwrap();

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    orchestrator.run(true).await.unwrap();

    let resumed = orchestrator.run(true).await.unwrap();
    assert_eq!(resumed.attempted, 0);
    assert_eq!(resumed.new_records, 0);
    assert_eq!(resumed.events_emitted, 0);

    // A full re-verification hits the fingerprint short-circuit for every record
    let fresh = orchestrator.run(false).await.unwrap();
    assert_eq!(fresh.attempted, 3);
    assert_eq!(fresh.succeeded, 3);
    assert_eq!(fresh.new_records, 0);
    assert_eq!(fresh.updated_records, 0);
    assert_eq!(fresh.events_emitted, 0);

    assert_eq!(all_events(&orchestrator).len(), 3);
}

#[tokio::test]
async fn test_resume_only_processes_unknown_urls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // First run only knows A and B
    mount_page(
        &server,
        "/index.html",
        listing_page(
            &["catalogue/book-a/index.html", "catalogue/book-b/index.html"],
            None,
        ),
    )
    .await;
    mount_page(
        &server,
        "/catalogue/book-a/index.html",
        detail_page("Book A", "51.77", "In stock", "Three"),
    )
    .await;
    mount_page(
        &server,
        "/catalogue/book-b/index.html",
        detail_page("Book B", "20.00", "In stock", "One"),
    )
    .await;

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    let first = orchestrator.run(true).await.unwrap();
    assert_eq!(first.attempted, 2);

    // The catalog now also lists C
    server.reset().await;
    mount_catalog(&server, "51.77").await;

    let resumed = orchestrator.run(true).await.unwrap();
    assert_eq!(resumed.discovered, 3);
    assert_eq!(resumed.attempted, 1);
    assert_eq!(resumed.new_records, 1);

    let requests = server.received_requests().await.unwrap();
    let detail_paths: Vec<String> = requests
        .iter()
        .map(|r| r.url.path().to_string())
        .filter(|p| p.contains("book-"))
        .collect();
    assert_eq!(detail_paths, vec!["/catalogue/book-c/index.html".to_string()]);

    let fresh = orchestrator.run(false).await.unwrap();
    assert_eq!(fresh.attempted, 3);
}

#[tokio::test]
async fn test_price_change_emits_one_event() {
    let server = MockServer::start().await;
    mount_catalog(&server, "51.77").await;
    let dir = TempDir::new().unwrap();

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    orchestrator.run(true).await.unwrap();

    server.reset().await;
    mount_catalog(&server, "55.00").await;

    let summary = orchestrator.run(false).await.unwrap();
    assert_eq!(summary.updated_records, 1);
    assert_eq!(summary.events_emitted, 1);

    let events: Vec<_> = all_events(&orchestrator)
        .into_iter()
        .filter(|e| e.kind != ChangeKind::NewRecord)
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Price);
    assert_eq!(events[0].old_value.as_deref(), Some("51.77"));
    assert_eq!(events[0].new_value.as_deref(), Some("55.00"));
    assert!(events[0].record_key.ends_with("/catalogue/book-a/index.html"));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Fails max_retries - 1 times before succeeding
    Mock::given(method("GET"))
        .and(path("/catalogue/book-a/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server, "51.77").await;

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    let summary = orchestrator.run(true).await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_exhausted_retries_are_counted_not_raised() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // max_retries = 2 allows 3 attempts in total
    Mock::given(method("GET"))
        .and(path("/catalogue/book-b/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .expect(3)
        .mount(&server)
        .await;
    mount_catalog(&server, "51.77").await;

    let mut config = create_test_config(&server.uri(), dir.path());
    config.crawler.max_retries = 2;
    let orchestrator = new_orchestrator(config);
    let summary = orchestrator.run(true).await.expect("Run should not fail");

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    let store = orchestrator.store();
    let store = store.lock().unwrap();
    let run = store.get_latest_run().unwrap().unwrap();
    assert_eq!(run.failed, 1);
    assert_eq!(store.count_records().unwrap(), 2);
}

#[tokio::test]
async fn test_discovery_failure_keeps_found_urls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/catalogue/page-2.html"))
        .respond_with(ResponseTemplate::new(502))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_catalog(&server, "51.77").await;

    let mut config = create_test_config(&server.uri(), dir.path());
    config.crawler.max_retries = 1;
    let orchestrator = new_orchestrator(config);
    let summary = orchestrator.run(true).await.unwrap();

    assert!(!summary.discovery_complete);
    assert_eq!(summary.pages_walked, 1);
    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_double_referenced_url_processed_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/index.html",
        listing_page(
            &["catalogue/book-a/index.html", "catalogue/book-a/index.html"],
            Some("catalogue/page-2.html"),
        ),
    )
    .await;
    mount_page(
        &server,
        "/catalogue/page-2.html",
        listing_page(&["book-a/index.html"], None),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/catalogue/book-a/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("Book A", "51.77", "In stock", "Three")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = new_orchestrator(create_test_config(&server.uri(), dir.path()));
    let summary = orchestrator.run(false).await.unwrap();

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.new_records, 1);

    let store = orchestrator.store();
    assert_eq!(store.lock().unwrap().count_records().unwrap(), 1);
}

#[tokio::test]
async fn test_oversized_snapshot_is_dropped() {
    let server = MockServer::start().await;
    mount_catalog(&server, "51.77").await;
    let dir = TempDir::new().unwrap();

    let mut config = create_test_config(&server.uri(), dir.path());
    config.crawler.snapshot_max_bytes = 64;
    let orchestrator = new_orchestrator(config);
    let summary = orchestrator.run(true).await.unwrap();
    assert_eq!(summary.succeeded, 3);

    let store = orchestrator.store();
    let store = store.lock().unwrap();
    let key = format!("{}/catalogue/book-c/index.html", server.uri());
    let stored = store.find_by_key(&key).unwrap().unwrap();
    assert!(stored.record.snapshot.is_none());
    assert_eq!(stored.record.name, "Book C");
}

#[tokio::test]
async fn test_scheduled_run_writes_report() {
    let server = MockServer::start().await;
    mount_catalog(&server, "51.77").await;
    let dir = TempDir::new().unwrap();

    let config = create_test_config(&server.uri(), dir.path());
    let scheduler = Scheduler::new(new_orchestrator(config)).unwrap();

    let first = scheduler.run_once().await.unwrap();
    assert_eq!(first.changes(), 3);
    assert_eq!(first.report.summary.count(ChangeKind::NewRecord), 3);
    let path = first.report_path.expect("Report not written");
    assert!(path.starts_with(dir.path().join("reports")));
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("new_record"));

    let second = scheduler.run_once().await.unwrap();
    assert_eq!(second.changes(), 0);
    assert_eq!(second.summary.attempted, 0);
}

/// Serves generated pages and records how many requests are in flight
struct InstrumentedCatalog {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    books: usize,
}

#[async_trait]
impl Transport for InstrumentedCatalog {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let body = if url.ends_with("/index.html") && !url.contains("/book-") {
            let links: Vec<String> = (0..self.books)
                .map(|i| format!("catalogue/book-{}/index.html", i))
                .collect();
            let links: Vec<&str> = links.iter().map(String::as_str).collect();
            listing_page(&links, None)
        } else {
            detail_page("Book", "1.00", "In stock", "Two")
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(TransportResponse {
            status: 200,
            final_url: url.to_string(),
            body: body.into_bytes(),
        })
    }
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("https://catalog.test", dir.path());
    config.crawler.max_concurrent_requests = 3;

    let transport = Arc::new(InstrumentedCatalog {
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        books: 20,
    });
    let orchestrator = Orchestrator::with_transport(
        config,
        SqliteStore::in_memory().unwrap(),
        transport.clone(),
    );

    let summary = orchestrator.run(true).await.unwrap();
    assert_eq!(summary.succeeded, 20);

    let max = transport.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "saw {} requests in flight", max);
    assert!(max >= 1);
}

//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test the full
//! crawl cycle end-to-end. Multi-domain and timing scenarios use in-process
//! fake fetchers instead.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_crawl::config::{
    Config, CrawlerConfig, OutputConfig, SharedFrontierConfig, StorageBackend, UserAgentConfig,
};
use sumi_crawl::crawler::{FetchStrategy, FetchedPage, StopReason};
use sumi_crawl::frontier::{InMemoryStore, SharedStore, StoreError};
use sumi_crawl::storage::{MemoryStorage, SqliteStorage, Storage};
use sumi_crawl::{CrawlRequest, CrawlStatus, FetchError, WebCrawler};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration
fn create_test_config(max_depth: u32, max_pages: u64) -> Config {
    Config {
        seeds: vec![],
        crawler: CrawlerConfig {
            max_depth,
            max_pages,
            max_retries: 2,
            retry_base_delay_ms: 1,
            requests_per_second: 200.0,
            per_domain_delay_ms: 0,
            num_workers: 4,
            respect_robots: false,
            request_timeout_secs: 5,
            ..Default::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig::default(),
        shared_frontier: None,
    }
}

fn html_page(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();

    let body = format!(
        "<html><head><title>{}</title></head><body><p>{}</p>{}</body></html>",
        title, title, anchors
    );
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, route: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html_page(title, links))
        .mount(server)
        .await;
}

fn crawler_with_memory(config: Config) -> (WebCrawler, MemoryStorage) {
    let storage = MemoryStorage::new();
    let crawler = WebCrawler::new(config)
        .unwrap()
        .with_storage(Box::new(storage.clone()));
    (crawler, storage)
}

fn crawled_paths(storage: &MemoryStorage) -> BTreeSet<String> {
    storage
        .results()
        .iter()
        .map(|r| r.url().path().to_string())
        .collect()
}

#[tokio::test]
async fn test_max_depth_zero_crawls_only_seed() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &["/a", "/b", "/c"]).await;
    mount_page(&server, "/a", "A", &[]).await;

    let (mut crawler, storage) = crawler_with_memory(create_test_config(0, 10));
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    let results = storage.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, CrawlStatus::Completed);
    assert_eq!(results[0].links.len(), 3);
    assert_eq!(summary.total_pages_crawled, 1);
    assert_eq!(summary.total_urls_found, 0);
    assert_eq!(summary.stop_reason, StopReason::FrontierExhausted);
}

#[tokio::test]
async fn test_cycle_is_crawled_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Root", &["/b"]).await;
    mount_page(&server, "/b", "B", &["/"]).await;

    let (mut crawler, storage) = crawler_with_memory(create_test_config(2, 100));
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    let results = storage.results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == CrawlStatus::Completed));
    assert_eq!(
        crawled_paths(&storage),
        BTreeSet::from(["/".to_string(), "/b".to_string()])
    );

    let b = results.iter().find(|r| r.url().path() == "/b").unwrap();
    assert_eq!(b.request.depth, 1);
    assert_eq!(b.request.priority, 1);
    assert_eq!(
        b.content.as_ref().and_then(|c| c.title.as_deref()),
        Some("B")
    );
    assert_eq!(summary.total_pages_crawled, 2);
}

#[tokio::test]
async fn test_crawl_is_idempotent() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Root", &["/a", "/b"]).await;
    mount_page(&server, "/a", "A", &["/c", "/b"]).await;
    mount_page(&server, "/b", "B", &["/d"]).await;
    mount_page(&server, "/c", "C", &["/"]).await;
    mount_page(&server, "/d", "D", &["/e"]).await;

    let seeds = vec![format!("{}/", server.uri())];

    let (mut first, first_storage) = crawler_with_memory(create_test_config(2, 100));
    first.crawl(&seeds).await.unwrap();

    let (mut second, second_storage) = crawler_with_memory(create_test_config(2, 100));
    second.crawl(&seeds).await.unwrap();

    let visited = crawled_paths(&first_storage);
    assert_eq!(visited, crawled_paths(&second_storage));
    assert_eq!(
        visited,
        ["/", "/a", "/b", "/c", "/d"]
            .iter()
            .map(|s| s.to_string())
            .collect::<BTreeSet<_>>()
    );
}

#[tokio::test]
async fn test_robots_disallow_skips_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;
    mount_page(&server, "/", "Home", &["/private/page", "/public"]).await;
    mount_page(&server, "/public", "Public", &[]).await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html_page("Secret", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(1, 100);
    config.crawler.respect_robots = true;

    let (mut crawler, storage) = crawler_with_memory(config);
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    let private = storage
        .results()
        .into_iter()
        .find(|r| r.url().path() == "/private/page")
        .unwrap();
    assert_eq!(private.status, CrawlStatus::Skipped);
    assert_eq!(private.error_kind.as_deref(), Some("robots"));
    assert_eq!(summary.total_pages_crawled, 2);
    assert_eq!(summary.total_skipped, 1);
}

#[tokio::test]
async fn test_max_pages_is_an_upper_bound() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..20).map(|i| format!("/page{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&server, "/", "Hub", &link_refs).await;
    for link in &links {
        mount_page(&server, link, link, &[]).await;
    }

    let (mut crawler, storage) = crawler_with_memory(create_test_config(2, 5));
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    assert_eq!(storage.results().len(), 5);
    assert_eq!(summary.total_results(), 5);
    assert_eq!(summary.stop_reason, StopReason::MaxPagesReached);
}

#[tokio::test]
async fn test_links_found_while_draining_are_discarded() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Hub", &["/a", "/b", "/c"]).await;

    let mut config = create_test_config(2, 1);
    config.crawler.num_workers = 2;

    let (mut crawler, storage) = crawler_with_memory(config);
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    assert_eq!(storage.results().len(), 1);
    assert_eq!(summary.links_discarded, 3);
    assert_eq!(summary.total_urls_found, 0);
}

#[tokio::test]
async fn test_single_worker_drains_on_last_budgeted_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Hub", &["/a", "/b", "/c"]).await;
    for route in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html_page(route, &[]))
            .expect(0)
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(2, 1);
    config.crawler.num_workers = 1;

    let (mut crawler, storage) = crawler_with_memory(config);
    let summary = crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    assert_eq!(storage.results().len(), 1);
    assert_eq!(summary.links_discarded, 3);
    assert_eq!(summary.total_urls_found, 0);
    assert_eq!(summary.stop_reason, StopReason::MaxPagesReached);
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (mut crawler, storage) = crawler_with_memory(create_test_config(1, 10));
    let summary = crawler
        .crawl(&[format!("{}/missing", server.uri())])
        .await
        .unwrap();

    let result = &storage.results()[0];
    assert_eq!(result.status, CrawlStatus::Failed);
    assert_eq!(result.status_code, Some(404));
    assert_eq!(result.error_kind.as_deref(), Some("http"));
    assert_eq!(result.retry_count, 0);
    assert_eq!(summary.total_failed, 1);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let (mut crawler, storage) = crawler_with_memory(create_test_config(1, 10));
    let summary = crawler
        .crawl(&[format!("{}/flaky", server.uri())])
        .await
        .unwrap();

    let result = &storage.results()[0];
    assert_eq!(result.status, CrawlStatus::Failed);
    assert_eq!(result.status_code, Some(503));
    assert_eq!(result.retry_count, 2);
    assert_eq!(summary.total_retries, 2);
}

#[tokio::test]
async fn test_exhausted_rate_limit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = create_test_config(1, 10);
    config.crawler.max_retries = 1;

    let (mut crawler, storage) = crawler_with_memory(config);
    let summary = crawler
        .crawl(&[format!("{}/busy", server.uri())])
        .await
        .unwrap();

    let result = &storage.results()[0];
    assert_eq!(result.status, CrawlStatus::RateLimited);
    assert_eq!(result.retry_count, 1);
    assert_eq!(summary.total_rate_limited, 1);
}

#[tokio::test]
async fn test_non_html_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"a": [1, 2]}"#, "application/json"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<a href=\"/x\">x</a>", "text/plain"))
        .mount(&server)
        .await;

    let (mut crawler, storage) = crawler_with_memory(create_test_config(1, 10));
    let summary = crawler
        .crawl(&[
            format!("{}/data", server.uri()),
            format!("{}/notes", server.uri()),
        ])
        .await
        .unwrap();

    assert_eq!(storage.results().len(), 2);
    for result in storage.results() {
        assert_eq!(result.status, CrawlStatus::Skipped);
        assert_eq!(result.error_kind.as_deref(), Some("content_type"));
        assert_eq!(result.status_code, Some(200));
    }
    assert_eq!(summary.total_skipped, 2);
    assert_eq!(summary.total_urls_found, 0);
}

#[tokio::test]
async fn test_results_saved_to_sqlite() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Root", &["/b"]).await;
    mount_page(&server, "/b", "B", &[]).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawl.db");

    let mut config = create_test_config(2, 10);
    config.output = OutputConfig {
        backend: StorageBackend::Sqlite,
        path: db_path.display().to_string(),
        summary_path: None,
        store_raw_html: true,
    };

    let mut crawler = WebCrawler::new(config).unwrap();
    crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();
    drop(crawler);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count().unwrap(), 2);

    let root = storage
        .get(&format!("{}/", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(root.status, CrawlStatus::Completed);
    assert!(root
        .content
        .and_then(|c| c.raw_html)
        .is_some_and(|html| html.contains("<title>Root</title>")));
}

#[tokio::test]
async fn test_cancelled_before_start_produces_nothing() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Home", &[]).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let (mut crawler, storage) = crawler_with_memory(create_test_config(1, 10));
    let summary = crawler
        .crawl_with_cancellation(&[format!("{}/", server.uri())], cancel)
        .await
        .unwrap();

    assert!(storage.results().is_empty());
    assert_eq!(summary.stop_reason, StopReason::Cancelled);
}

#[tokio::test]
async fn test_page_callback_sees_every_result() {
    let server = MockServer::start().await;
    mount_page(&server, "/", "Root", &["/a", "/b"]).await;
    mount_page(&server, "/a", "A", &[]).await;
    mount_page(&server, "/b", "B", &[]).await;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let (crawler, _storage) = crawler_with_memory(create_test_config(1, 10));
    let mut crawler = crawler.on_page_crawled(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    crawler.crawl(&[format!("{}/", server.uri())]).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

/// Serves a fixed set of pages and records every fetch
#[derive(Default)]
struct FakeWeb {
    pages: HashMap<String, Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeWeb {
    fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            links.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchStrategy for FakeWeb {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());

        let links = self.pages.get(url.as_str()).ok_or(FetchError::Http(404))?;
        let body: String = links
            .iter()
            .map(|href| format!(r#"<a href="{}">x</a>"#, href))
            .collect();

        Ok(FetchedPage {
            final_url: url.clone(),
            status_code: 200,
            content_type: Some("text/html".to_string()),
            body: format!("<html><body>{}</body></html>", body),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[tokio::test]
async fn test_same_domain_only_discards_third_domain() {
    let web = Arc::new(
        FakeWeb::default()
            .page("https://a.test/", &["https://a.test/x", "https://c.test/"])
            .page("https://a.test/x", &["https://b.test/"])
            .page("https://b.test/", &["https://c.test/other", "/y"])
            .page("https://b.test/y", &[])
            .page("https://c.test/", &[]),
    );

    let (crawler, storage) = crawler_with_memory(create_test_config(3, 100));
    let mut crawler = crawler.with_fetcher(Arc::clone(&web) as Arc<dyn FetchStrategy>);
    crawler
        .crawl(&["https://a.test/".to_string(), "https://b.test/".to_string()])
        .await
        .unwrap();

    let fetched = web.fetched();
    assert!(fetched.iter().all(|u| !u.contains("c.test")));
    assert_eq!(fetched.len(), 4);
    assert_eq!(storage.results().len(), 4);
}

#[tokio::test]
async fn test_shared_frontier_splits_work_without_duplicates() {
    let web = Arc::new(
        FakeWeb::default()
            .page("https://a.test/", &["/1", "/2", "/3", "/4"])
            .page("https://a.test/1", &["/5", "/"])
            .page("https://a.test/2", &["/6"])
            .page("https://a.test/3", &[])
            .page("https://a.test/4", &["/1"])
            .page("https://a.test/5", &[])
            .page("https://a.test/6", &[]),
    );
    let store = Arc::new(InMemoryStore::new());

    let shared_config = || {
        let mut config = create_test_config(3, 100);
        config.crawler.use_shared_frontier = true;
        config.shared_frontier = Some(SharedFrontierConfig {
            redis_url: "redis://127.0.0.1/".to_string(),
            key_prefix: "test".to_string(),
            max_store_retries: 3,
        });
        config
    };

    let (first, first_storage) = crawler_with_memory(shared_config());
    let mut first = first
        .with_fetcher(Arc::clone(&web) as Arc<dyn FetchStrategy>)
        .with_shared_store(Arc::clone(&store) as Arc<dyn SharedStore>);
    let (second, second_storage) = crawler_with_memory(shared_config());
    let mut second = second
        .with_fetcher(Arc::clone(&web) as Arc<dyn FetchStrategy>)
        .with_shared_store(Arc::clone(&store) as Arc<dyn SharedStore>);

    let seeds = vec!["https://a.test/".to_string()];
    let (a, b) = tokio::join!(first.crawl(&seeds), second.crawl(&seeds));
    a.unwrap();
    b.unwrap();

    let mut fetched = web.fetched();
    let total = fetched.len();
    fetched.sort();
    fetched.dedup();
    assert_eq!(fetched.len(), total, "a URL was fetched twice");
    assert_eq!(total, 7);
    assert_eq!(
        first_storage.results().len() + second_storage.results().len(),
        7
    );
}

/// Shared store whose first pop hangs before reporting an empty queue
struct StallingStore {
    inner: InMemoryStore,
    stall: Duration,
    stalled: AtomicBool,
}

impl StallingStore {
    fn new(stall: Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            stall,
            stalled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SharedStore for StallingStore {
    async fn try_insert(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.try_insert(key).await
    }

    async fn enqueue(&self, request: &CrawlRequest) -> Result<(), StoreError> {
        self.inner.enqueue(request).await
    }

    async fn pop_highest_priority(&self) -> Result<Option<CrawlRequest>, StoreError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.stall).await;
            return Ok(None);
        }
        self.inner.pop_highest_priority().await
    }

    async fn pending(&self) -> Result<usize, StoreError> {
        self.inner.pending().await
    }

    async fn push_if_new(&self, request: &CrawlRequest) -> Result<bool, StoreError> {
        self.inner.push_if_new(request).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_pop_does_not_block_other_workers() {
    let web = Arc::new(
        FakeWeb::default()
            .page("https://a.test/", &["/1", "/2", "/3"])
            .page("https://a.test/1", &[])
            .page("https://a.test/2", &[])
            .page("https://a.test/3", &[]),
    );
    let store = Arc::new(StallingStore::new(Duration::from_secs(30)));

    let mut config = create_test_config(2, 100);
    config.crawler.num_workers = 2;
    config.crawler.use_shared_frontier = true;
    config.shared_frontier = Some(SharedFrontierConfig {
        redis_url: "redis://127.0.0.1/".to_string(),
        key_prefix: "test".to_string(),
        max_store_retries: 3,
    });

    let finished_at = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::clone(&finished_at);
    let (crawler, storage) = crawler_with_memory(config);
    let mut crawler = crawler
        .with_fetcher(Arc::clone(&web) as Arc<dyn FetchStrategy>)
        .with_shared_store(Arc::clone(&store) as Arc<dyn SharedStore>)
        .on_page_crawled(move |_| finished.lock().unwrap().push(tokio::time::Instant::now()));

    let start = tokio::time::Instant::now();
    let summary = crawler
        .crawl(&["https://a.test/".to_string()])
        .await
        .unwrap();

    assert_eq!(storage.results().len(), 4);
    let finished_at = finished_at.lock().unwrap().clone();
    assert_eq!(finished_at.len(), 4);
    assert!(finished_at
        .iter()
        .all(|t| *t - start < Duration::from_secs(1)));

    // The empty frontier is only declared once the slow pop has answered
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(summary.stop_reason, StopReason::FrontierExhausted);
}

/// Always times out and records when it was called
#[derive(Default)]
struct TimeoutFetcher {
    calls: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl FetchStrategy for TimeoutFetcher {
    async fn fetch(&self, _url: &Url) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(tokio::time::Instant::now());
        Err(FetchError::Timeout)
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}

#[tokio::test(start_paused = true)]
async fn test_backoff_sequence_on_timeouts() {
    let fetcher = Arc::new(TimeoutFetcher::default());

    let mut config = create_test_config(0, 10);
    config.crawler.max_retries = 3;
    config.crawler.retry_base_delay_ms = 1000;
    config.crawler.requests_per_second = 1000.0;
    config.crawler.num_workers = 1;

    let (crawler, storage) = crawler_with_memory(config);
    let mut crawler = crawler.with_fetcher(Arc::clone(&fetcher) as Arc<dyn FetchStrategy>);
    crawler
        .crawl(&["https://slow.test/".to_string()])
        .await
        .unwrap();

    let calls = fetcher.calls.lock().unwrap().clone();
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );

    let result = &storage.results()[0];
    assert_eq!(result.status, CrawlStatus::Failed);
    assert_eq!(result.error_kind.as_deref(), Some("timeout"));
    assert_eq!(result.retry_count, 3);
}

//! Value types exchanged between the frontier, workers, and storage
//!
//! - `CrawlRequest`: one pending URL with its depth, priority, and provenance
//! - `CrawlResult`: the terminal outcome of one request
//! - `PageContent`: structured fields produced by the parsing collaborator

use crate::state::CrawlStatus;
use crate::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// A URL waiting in the frontier
///
/// Requests are created once (for a seed, or for a discovered link) and never
/// mutated afterwards. Rediscovering a URL creates a new request, which the
/// frontier then suppresses as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Normalized absolute URL; also the deduplication key
    pub url: Url,

    /// Link distance from the nearest seed
    pub depth: u32,

    /// Lower values are popped first
    pub priority: u32,

    /// Page on which this URL was discovered (None for seeds)
    pub discovered_from: Option<Url>,

    /// When the request was created
    pub enqueued_at: DateTime<Utc>,
}

impl CrawlRequest {
    /// Creates a request for a seed URL (depth 0, priority 0)
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            priority: 0,
            discovered_from: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Creates a request for a link discovered on `parent`
    ///
    /// The depth is one more than the parent's, and the priority equals the
    /// depth so shallower pages are preferred.
    pub fn discovered(url: Url, parent: &CrawlRequest) -> Self {
        let depth = parent.depth + 1;
        Self {
            url,
            depth,
            priority: depth,
            discovered_from: Some(parent.url.clone()),
            enqueued_at: Utc::now(),
        }
    }

    /// The deduplication key of this request
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    /// The rate-limiting domain of this request
    pub fn domain(&self) -> Option<String> {
        crate::url::extract_domain(&self.url)
    }
}

/// Structured content extracted from a fetched page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: Option<String>,

    /// Visible text with whitespace collapsed
    pub text: String,

    /// Output of the registered extractors, keyed by extractor
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Raw document, kept only when storage asks for it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
}

/// Terminal outcome of one crawl request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub request: CrawlRequest,

    /// URL after redirects, when a response was received
    pub final_url: Option<Url>,

    /// HTTP status of the last response, if any
    pub status_code: Option<u16>,

    /// Machine-readable failure kind (e.g. "timeout", "http", "robots")
    pub error_kind: Option<String>,

    /// Human-readable failure or skip reason
    pub error: Option<String>,

    pub content: Option<PageContent>,

    /// Absolute URLs found on the page, in document order
    pub links: Vec<Url>,

    pub status: CrawlStatus,

    /// Number of retries performed before the terminal attempt
    pub retry_count: u32,

    /// Wall time from dispatch to terminal outcome
    pub elapsed_ms: u64,

    /// Size of the response body
    pub bytes: u64,

    pub crawled_at: DateTime<Utc>,
}

impl CrawlResult {
    /// Creates an empty result with the given status
    pub fn new(request: CrawlRequest, status: CrawlStatus) -> Self {
        Self {
            request,
            final_url: None,
            status_code: None,
            error_kind: None,
            error: None,
            content: None,
            links: Vec::new(),
            status,
            retry_count: 0,
            elapsed_ms: 0,
            bytes: 0,
            crawled_at: Utc::now(),
        }
    }

    /// A page that was not fetched, with a short kind and a reason
    pub fn skipped(request: CrawlRequest, kind: &str, reason: impl Into<String>) -> Self {
        let mut result = Self::new(request, CrawlStatus::Skipped);
        result.error_kind = Some(kind.to_string());
        result.error = Some(reason.into());
        result
    }

    /// A page whose fetch ended in `error`
    ///
    /// An exhausted 429 is reported as `RateLimited`, every other error as `Failed`.
    pub fn from_fetch_error(request: CrawlRequest, error: &FetchError, retry_count: u32) -> Self {
        let status = match error {
            FetchError::RateLimited => CrawlStatus::RateLimited,
            _ => CrawlStatus::Failed,
        };

        let mut result = Self::new(request, status);
        result.status_code = error.status_code();
        result.error_kind = Some(error.kind().to_string());
        result.error = Some(error.to_string());
        result.retry_count = retry_count;
        result
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }
}

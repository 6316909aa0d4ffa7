use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed URLs to start crawling from (CLI seeds are appended)
    #[serde(default)]
    pub seeds: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(rename = "shared-frontier")]
    pub shared_frontier: Option<SharedFrontierConfig>,
}

/// Crawler behavior configuration
///
/// This is the read-only snapshot every component of a run consults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum link distance from the nearest seed
    pub max_depth: u32,

    /// Upper bound on the number of pages processed in one run
    pub max_pages: u64,

    /// Only follow links into the allowed domains (seed domains by default)
    pub same_domain_only: bool,

    /// Domain patterns (e.g., "example.com" or "*.example.com") to stay within
    pub allowed_domains: Vec<String>,

    /// Regular expressions; matching URLs are never enqueued
    pub excluded_patterns: Vec<String>,

    /// Number of retries for a retriable fetch failure
    pub max_retries: u32,

    /// First backoff delay (milliseconds); doubles on every retry
    pub retry_base_delay_ms: u64,

    /// Overall dispatch rate budget across all domains
    pub requests_per_second: f64,

    /// Minimum time between two requests to the same domain (milliseconds)
    pub per_domain_delay_ms: u64,

    /// Number of concurrent worker tasks
    pub num_workers: usize,

    /// Consult robots.txt before fetching
    pub respect_robots: bool,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,

    /// Maximum number of redirects followed per request
    pub max_redirects: usize,

    /// Use the rendering fetch strategy for matching URLs
    pub enable_dynamic: bool,

    /// Time the renderer waits for scripts to settle (seconds)
    pub dynamic_wait_time_secs: u64,

    /// URL patterns that require rendering (empty = every URL)
    pub dynamic_patterns: Vec<String>,

    /// Endpoint of the rendering service used by the dynamic fetch strategy
    pub render_endpoint: Option<String>,

    /// Keep the frontier in the shared store instead of process memory
    pub use_shared_frontier: bool,

    /// Stop the crawl after this many seconds (in-flight work still drains)
    pub crawl_timeout_secs: Option<u64>,
}

impl CrawlerConfig {
    pub fn per_domain_delay(&self) -> Duration {
        Duration::from_millis(self.per_domain_delay_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dynamic_wait_time(&self) -> Duration {
        Duration::from_secs(self.dynamic_wait_time_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            same_domain_only: true,
            allowed_domains: Vec::new(),
            excluded_patterns: default_excluded_patterns(),
            max_retries: 3,
            retry_base_delay_ms: 1000,
            requests_per_second: 2.0,
            per_domain_delay_ms: 1000,
            num_workers: 4,
            respect_robots: true,
            request_timeout_secs: 30,
            max_redirects: 5,
            enable_dynamic: false,
            dynamic_wait_time_secs: 5,
            dynamic_patterns: Vec::new(),
            render_endpoint: None,
            use_shared_frontier: false,
            crawl_timeout_secs: None,
        }
    }
}

fn default_excluded_patterns() -> Vec<String> {
    [
        r".*\.(jpg|jpeg|png|gif|svg|ico|css|js|woff|woff2|ttf|eot)$",
        r".*\.(pdf|doc|docx|xls|xlsx|ppt|pptx|zip|tar|gz)$",
        r".*\.(mp3|mp4|avi|mov|wmv|flv)$",
        r".*(login|logout|signup|register|auth).*",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
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

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiCrawl".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

/// Where crawl results are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Jsonl,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Storage backend for crawl results
    pub backend: StorageBackend,

    /// Path to the SQLite database or JSON lines file
    pub path: String,

    /// Optional path for a markdown crawl summary
    #[serde(default)]
    pub summary_path: Option<String>,

    /// Keep the raw HTML of each page in storage
    #[serde(default)]
    pub store_raw_html: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: "./crawl_output.db".to_string(),
            summary_path: None,
            store_raw_html: false,
        }
    }
}

/// Connection settings for the shared frontier store
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SharedFrontierConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Prefix for every key the crawler writes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Attempts for a store round trip before the run is aborted
    #[serde(default = "default_max_store_retries")]
    pub max_store_retries: u32,
}

fn default_key_prefix() -> String {
    "sumi-crawl".to_string()
}

fn default_max_store_retries() -> u32 {
    5
}

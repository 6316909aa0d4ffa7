//! Sumi-Crawl: a polite, concurrent web crawler
//!
//! This crate implements the scheduling core of a web crawler: a deduplicating
//! priority frontier (in-process or backed by a shared store), a per-domain
//! rate limiter with retry and backoff, and a bounded worker pool that ties
//! fetching, politeness, and failure handling together.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod model;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Crawl operations
///
/// Only run-level failures surface here. Per-page failures are recorded as
/// `CrawlResult`s and never abort a crawl.
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("Shared store error: {0}")]
    Store(#[from] frontier::StoreError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

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

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Typed failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("Rate limited (HTTP 429)")]
    RateLimited,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Rendering service error: {0}")]
    Render(String),

    #[error("Redirect error: {0}")]
    Redirect(String),
}

impl FetchError {
    /// Maps an HTTP status code to a fetch error, if the status is an error
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(Self::RateLimited),
            400..=599 => Some(Self::Http(status)),
            _ => None,
        }
    }

    /// Classifies a reqwest error into the crawler's error taxonomy
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }

        if let Some(status) = error.status() {
            if let Some(mapped) = Self::from_status(status.as_u16()) {
                return mapped;
            }
        }

        if error.is_builder() {
            return Self::InvalidUrl(error.to_string());
        }

        if error.is_redirect() {
            return Self::Redirect(error.to_string());
        }

        // hyper reports resolver failures as connect errors; the chain says which
        let chain = error_chain(error);
        if error.is_connect() {
            if chain.contains("dns error") || chain.contains("failed to lookup address") {
                return Self::Dns(chain);
            }
            return Self::Connection(chain);
        }

        if error.is_body() || error.is_decode() {
            return Self::Body(chain);
        }

        Self::Connection(chain)
    }

    /// Returns true if the failure is transient and the fetch should be retried
    ///
    /// Timeouts, connection failures, 5xx responses and 429 are retriable.
    /// Other 4xx responses, DNS failures, redirect loops and malformed URLs are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::RateLimited | Self::Body(_) => true,
            Self::Render(_) => true,
            Self::Http(code) => *code >= 500,
            Self::Dns(_) | Self::InvalidUrl(_) | Self::Redirect(_) => false,
        }
    }

    /// Returns the HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(*code),
            Self::RateLimited => Some(429),
            _ => None,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection(_) => "connection",
            Self::Dns(_) => "dns",
            Self::Http(_) => "http",
            Self::RateLimited => "rate_limited",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Body(_) => "body",
            Self::Render(_) => "render",
            Self::Redirect(_) => "redirect",
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Failure to turn fetched content into structured fields
#[derive(Debug, Clone, Error)]
#[error("HTML parse error for {url}: {message}")]
pub struct ParseError {
    pub url: String,
    pub message: String,
}

/// Result type alias for Sumi-Crawl operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, CrawlerConfig};
pub use crawler::{CrawlSummary, WebCrawler};
pub use frontier::Frontier;
pub use model::{CrawlRequest, CrawlResult};
pub use state::{CrawlStatus, DomainBucket};
pub use crate::url::{extract_domain, normalize_url};

//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP and rendered fetching with retry and backoff
//! - HTML parsing and link extraction
//! - Per-domain rate limiting
//! - The worker pool and overall crawl coordination

mod coordinator;
pub mod fetcher;
mod links;
pub mod parser;
mod rate_limiter;
mod retry;
mod stats;
mod worker;

pub use coordinator::WebCrawler;
pub use fetcher::{
    build_http_client, DynamicFetcher, FetchRouter, FetchStrategy, FetchedPage, StaticFetcher,
};
pub use links::LinkFilter;
pub use parser::{
    Extractor, HeadingsExtractor, HtmlParser, JsonLdExtractor, MetadataExtractor, ParsedPage,
    Parser,
};
pub use rate_limiter::{DispatchPermit, RateLimiter};
pub use retry::RetryPolicy;
pub use stats::{CrawlStats, CrawlSummary, StopReason};
pub use worker::{PageCallback, SharedStorage};

use crate::config::Config;
use crate::SumiError;

/// Runs a complete crawl with the default collaborators
///
/// Seeds come from the configuration.
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - The crawl ran to a stop condition
/// * `Err(SumiError)` - Invalid configuration or lost shared frontier
pub async fn crawl(config: Config) -> Result<CrawlSummary, SumiError> {
    WebCrawler::new(config)?.crawl(&[]).await
}

//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlStatus`: terminal outcome of one page (completed, failed, skipped, rate limited)
//! - `DomainBucket`: per-domain politeness state used by the rate limiter

mod crawl_status;
mod domain_bucket;

pub use crawl_status::CrawlStatus;
pub use domain_bucket::DomainBucket;

//! Crawl statistics
//!
//! `CrawlStats` is shared by every worker and only ever incremented.
//! `CrawlSummary` is the snapshot returned when the run is done.

use crate::model::CrawlResult;
use crate::state::CrawlStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing pending and nothing in flight
    FrontierExhausted,
    MaxPagesReached,
    /// Stopped from outside (token, timeout, Ctrl-C)
    Cancelled,
    /// The shared frontier became unreachable
    StoreFailure,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FrontierExhausted => "frontier_exhausted",
            Self::MaxPagesReached => "max_pages_reached",
            Self::Cancelled => "cancelled",
            Self::StoreFailure => "store_failure",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters for one run
#[derive(Debug, Default)]
pub struct CrawlStats {
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    rate_limited: AtomicU64,
    urls_found: AtomicU64,
    bytes: AtomicU64,
    links_discarded: AtomicU64,
    retries: AtomicU64,
    domains: Mutex<BTreeSet<String>>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a terminal result and returns the number of finished pages
    pub fn record(&self, result: &CrawlResult) -> u64 {
        let counter = match result.status {
            CrawlStatus::Completed => &self.completed,
            CrawlStatus::Failed => &self.failed,
            CrawlStatus::Skipped => &self.skipped,
            CrawlStatus::RateLimited => &self.rate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(result.bytes, Ordering::Relaxed);
        self.retries
            .fetch_add(u64::from(result.retry_count), Ordering::Relaxed);

        if result.status == CrawlStatus::Completed {
            if let Some(domain) = result.request.domain() {
                self.domains
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(domain);
            }
        }

        self.finished()
    }

    /// Counts links accepted into the frontier
    pub fn record_urls_found(&self, count: usize) {
        self.urls_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Counts links dropped because the run was draining
    pub fn record_discarded(&self, count: usize) {
        self.links_discarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Pages with a terminal result, whatever the status
    pub fn finished(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed)
            + self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn count(&self, status: CrawlStatus) -> u64 {
        match status {
            CrawlStatus::Completed => self.completed.load(Ordering::Relaxed),
            CrawlStatus::Failed => self.failed.load(Ordering::Relaxed),
            CrawlStatus::Skipped => self.skipped.load(Ordering::Relaxed),
            CrawlStatus::RateLimited => self.rate_limited.load(Ordering::Relaxed),
        }
    }

    /// Freezes the counters into a summary
    pub fn summarize(
        &self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        stop_reason: StopReason,
    ) -> CrawlSummary {
        let elapsed_seconds = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let total_pages_crawled = self.count(CrawlStatus::Completed);
        let pages_per_second = if elapsed_seconds > 0.0 {
            total_pages_crawled as f64 / elapsed_seconds
        } else {
            0.0
        };

        let status_counts = CrawlStatus::ALL
            .iter()
            .map(|&status| (status, self.count(status)))
            .filter(|(_, count)| *count > 0)
            .collect();

        CrawlSummary {
            total_pages_crawled,
            total_failed: self.count(CrawlStatus::Failed),
            total_skipped: self.count(CrawlStatus::Skipped),
            total_rate_limited: self.count(CrawlStatus::RateLimited),
            total_urls_found: self.urls_found.load(Ordering::Relaxed),
            total_bytes_downloaded: self.bytes.load(Ordering::Relaxed),
            links_discarded: self.links_discarded.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
            domains_crawled: self
                .domains
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
            started_at,
            finished_at,
            elapsed_seconds,
            pages_per_second,
            status_counts,
            stop_reason,
        }
    }
}

/// Final statistics of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    /// Pages fetched and parsed successfully
    pub total_pages_crawled: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    pub total_rate_limited: u64,

    /// Links accepted into the frontier
    pub total_urls_found: u64,
    pub total_bytes_downloaded: u64,

    /// Links dropped while draining
    pub links_discarded: u64,
    pub total_retries: u64,

    /// Domains with at least one completed page, sorted
    pub domains_crawled: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub pages_per_second: f64,

    /// Non-zero counts per status
    pub status_counts: BTreeMap<CrawlStatus, u64>,

    pub stop_reason: StopReason,
}

impl CrawlSummary {
    /// Every page with a terminal result
    pub fn total_results(&self) -> u64 {
        self.status_counts.values().sum()
    }

    /// Percentage of results that completed
    pub fn success_rate(&self) -> f64 {
        let total = self.total_results();
        if total == 0 {
            return 0.0;
        }
        self.total_pages_crawled as f64 / total as f64 * 100.0
    }
}

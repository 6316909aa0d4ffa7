//! Per-run robots.txt cache
//!
//! One entry per origin (`scheme://host[:port]`), the scope a robots.txt file
//! governs. An entry older than the TTL is treated as absent, so the next
//! visit to that origin refetches robots.txt.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default lifetime of a cached robots.txt
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct Entry {
    robots: ParsedRobots,
    host: String,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RobotsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::hours(DEFAULT_TTL_HOURS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at <= self.ttl
    }

    /// Fresh rules for `origin`, if any
    pub fn get(&self, origin: &str) -> Option<ParsedRobots> {
        let now = Utc::now();
        self.lock()
            .get(origin)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.robots.clone())
    }

    /// Most recently fetched fresh rules of any origin on `host`
    pub fn latest_for_host(&self, host: &str) -> Option<ParsedRobots> {
        let now = Utc::now();
        self.lock()
            .values()
            .filter(|entry| entry.host == host && self.is_fresh(entry, now))
            .max_by_key(|entry| entry.fetched_at)
            .map(|entry| entry.robots.clone())
    }

    /// Stores freshly fetched rules, replacing any previous entry
    pub fn insert(&self, origin: impl Into<String>, host: impl Into<String>, robots: ParsedRobots) {
        self.insert_at(origin.into(), host.into(), robots, Utc::now());
    }

    fn insert_at(&self, origin: String, host: String, robots: ParsedRobots, fetched_at: DateTime<Utc>) {
        self.lock().insert(
            origin,
            Entry {
                robots,
                host,
                fetched_at,
            },
        );
    }

    /// Number of origins with an entry, stale or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

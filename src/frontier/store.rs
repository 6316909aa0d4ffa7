use super::queue::PendingQueue;
use super::StoreError;
use crate::model::CrawlRequest;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Coordination store behind the distributed frontier
///
/// Every method is a single round trip. `try_insert` and
/// `pop_highest_priority` must be atomic across all processes sharing the
/// store: concurrent inserts of one key accept exactly one, and concurrent
/// pops never return the same request twice.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Adds `key` to the seen set; returns true if it was not there yet
    async fn try_insert(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds a request to the pending queue
    async fn enqueue(&self, request: &CrawlRequest) -> Result<(), StoreError>;

    /// Removes and returns the pending request with the lowest priority value
    async fn pop_highest_priority(&self) -> Result<Option<CrawlRequest>, StoreError>;

    /// Number of pending requests
    async fn pending(&self) -> Result<usize, StoreError>;

    /// Dedup and enqueue in one step
    ///
    /// The default runs `try_insert` then `enqueue`. Stores that can do both
    /// atomically should override it, otherwise a failure between the two
    /// calls leaves the URL seen but never queued.
    async fn push_if_new(&self, request: &CrawlRequest) -> Result<bool, StoreError> {
        if !self.try_insert(request.key()).await? {
            return Ok(false);
        }
        self.enqueue(request).await?;
        Ok(true)
    }
}

/// Process-local `SharedStore`
///
/// Lets several frontiers (e.g. one per simulated process) share one
/// logical queue without an external service.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<String>,
    queue: PendingQueue,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys ever inserted
    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn try_insert(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().seen.insert(key.to_string()))
    }

    async fn enqueue(&self, request: &CrawlRequest) -> Result<(), StoreError> {
        self.lock().queue.push(request.clone());
        Ok(())
    }

    async fn pop_highest_priority(&self) -> Result<Option<CrawlRequest>, StoreError> {
        Ok(self.lock().queue.pop())
    }

    async fn pending(&self) -> Result<usize, StoreError> {
        Ok(self.lock().queue.len())
    }

    async fn push_if_new(&self, request: &CrawlRequest) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if !inner.seen.insert(request.key().to_string()) {
            return Ok(false);
        }
        inner.queue.push(request.clone());
        Ok(true)
    }
}

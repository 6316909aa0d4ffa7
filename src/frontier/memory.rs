use super::queue::PendingQueue;
use super::{CrawlScope, Frontier, FrontierError};
use crate::model::CrawlRequest;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// In-process frontier
///
/// The seen set and the pending queue live behind a single mutex, so a
/// dedup check and the matching insert or removal are one atomic step. The
/// lock is never held across an await point.
#[derive(Debug)]
pub struct MemoryFrontier {
    scope: CrawlScope,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // Never shrinks during a run: popped URLs stay seen
    seen: HashSet<String>,
    queue: PendingQueue,
}

impl MemoryFrontier {
    pub fn new(scope: CrawlScope) -> Self {
        Self {
            scope,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a request; the synchronous core of `Frontier::push`
    pub fn insert(&self, request: CrawlRequest) -> bool {
        if !self.scope.admits(&request) {
            tracing::trace!(url = %request.url, depth = request.depth, "Out of scope, not enqueued");
            return false;
        }

        let mut inner = self.lock();
        if !inner.seen.insert(request.key().to_string()) {
            return false;
        }
        inner.queue.push(request);
        true
    }

    /// Removes the next request; the synchronous core of `Frontier::pop`
    pub fn take(&self) -> Option<CrawlRequest> {
        self.lock().queue.pop()
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct URLs accepted during this run
    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn has_seen(&self, url: &str) -> bool {
        self.lock().seen.contains(url)
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn push(&self, request: CrawlRequest) -> Result<bool, FrontierError> {
        Ok(self.insert(request))
    }

    async fn pop(&self) -> Result<Option<CrawlRequest>, FrontierError> {
        Ok(self.take())
    }

    async fn size(&self) -> Result<usize, FrontierError> {
        Ok(self.len())
    }

    fn scope(&self) -> &CrawlScope {
        &self.scope
    }
}

use crate::model::CrawlResult;
use crate::storage::traits::{Storage, StorageResult};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage that keeps results in memory
///
/// Clones share the same buffer, so a caller can keep a handle after giving
/// the storage to a crawler.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    results: Arc<Mutex<Vec<CrawlResult>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved result, in save order
    pub fn results(&self) -> Vec<CrawlResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest result saved for `url`
    pub fn get(&self, url: &str) -> Option<CrawlResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|r| r.url().as_str() == url)
            .cloned()
    }
}

impl Storage for MemoryStorage {
    fn save(&mut self, result: &CrawlResult) -> StorageResult<()> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }

    fn count(&self) -> StorageResult<u64> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let mut urls: Vec<&str> = results.iter().map(|r| r.url().as_str()).collect();
        urls.sort_unstable();
        urls.dedup();
        Ok(urls.len() as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

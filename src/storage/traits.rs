//! The result sink every backend implements

use crate::model::CrawlResult;
use thiserror::Error;

/// Failure to persist or read back a crawl result
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only sink for crawl results
///
/// Saving the same URL twice keeps the latest result. A failed save is
/// logged by the crawler and never aborts a run.
pub trait Storage: Send {
    /// Persists one terminal result
    fn save(&mut self, result: &CrawlResult) -> StorageResult<()>;

    /// Number of distinct URLs stored
    fn count(&self) -> StorageResult<u64>;

    /// Makes every saved result durable
    fn flush(&mut self) -> StorageResult<()>;

    /// Short name used in logs
    fn backend_name(&self) -> &'static str;
}

//! URL frontier: the prioritized, deduplicated set of URLs awaiting a fetch
//!
//! # Variants
//!
//! - `MemoryFrontier`: single process; one mutex guards the seen set and the queue
//! - `SharedFrontier`: several processes share one logical frontier through a
//!   `SharedStore` whose dedup and pop primitives are atomic
//!
//! Both variants apply a `CrawlScope` on push, so every request that can be
//! popped is within the depth and domain bounds of the run.

mod memory;
mod queue;
mod redis_store;
mod scope;
mod shared;
mod store;

pub use memory::MemoryFrontier;
pub use redis_store::RedisStore;
pub use scope::CrawlScope;
pub use shared::SharedFrontier;
pub use store::{InMemoryStore, SharedStore};

use crate::model::CrawlRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from a shared store round trip
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode or decode request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Backend(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        if error.is_io_error()
            || error.is_connection_refusal()
            || error.is_connection_dropped()
            || error.is_timeout()
        {
            Self::Unavailable(error.to_string())
        } else {
            Self::Backend(error.to_string())
        }
    }
}

/// Errors surfaced by a frontier
///
/// Only the shared variant can fail; an error here aborts the run.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Shared store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Shared store rejected the operation: {0}")]
    Store(#[source] StoreError),
}

/// The frontier contract shared by both variants
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Inserts a request unless its URL was seen before in this run
    ///
    /// Returns true if the request was accepted. Duplicates and out-of-scope
    /// requests are a no-op returning false.
    async fn push(&self, request: CrawlRequest) -> Result<bool, FrontierError>;

    /// Removes and returns the pending request with the lowest priority value
    ///
    /// Ties are broken by insertion order. Returns None when nothing is pending.
    async fn pop(&self) -> Result<Option<CrawlRequest>, FrontierError>;

    /// Number of pending requests
    async fn size(&self) -> Result<usize, FrontierError>;

    /// The bounds applied on push
    fn scope(&self) -> &CrawlScope;
}

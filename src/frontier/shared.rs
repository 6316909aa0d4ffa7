use super::{CrawlScope, Frontier, FrontierError, SharedStore, StoreError};
use crate::model::CrawlRequest;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Delay before the first retry of a failed store call; doubles per attempt
const STORE_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Frontier whose seen set and queue live in a `SharedStore`
///
/// Several processes pointing at the same store observe one logical
/// frontier. Transient store failures are retried with exponential backoff;
/// once the attempts are exhausted the error is returned and aborts the run.
pub struct SharedFrontier {
    store: Arc<dyn SharedStore>,
    scope: CrawlScope,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl SharedFrontier {
    pub fn new(store: Arc<dyn SharedStore>, scope: CrawlScope, max_attempts: u32) -> Self {
        Self {
            store,
            scope,
            max_attempts: max_attempts.max(1),
            retry_base_delay: STORE_RETRY_BASE_DELAY,
        }
    }

    /// Overrides the first retry delay of store calls
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, FrontierError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(FrontierError::Store(e)),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!(operation, attempts = attempt, error = %e, "Shared store unavailable, giving up");
                    return Err(FrontierError::StoreUnavailable {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Shared store call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl Frontier for SharedFrontier {
    async fn push(&self, request: CrawlRequest) -> Result<bool, FrontierError> {
        if !self.scope.admits(&request) {
            return Ok(false);
        }
        self.with_retry("push", || self.store.push_if_new(&request))
            .await
    }

    async fn pop(&self) -> Result<Option<CrawlRequest>, FrontierError> {
        self.with_retry("pop", || self.store.pop_highest_priority())
            .await
    }

    async fn size(&self) -> Result<usize, FrontierError> {
        self.with_retry("size", || self.store.pending()).await
    }

    fn scope(&self) -> &CrawlScope {
        &self.scope
    }
}

//! Per-domain politeness and global dispatch budget
//!
//! `acquire` enforces two constraints before a request may be dispatched:
//!
//! - Global: at most `max_in_flight` requests hold a permit at once, and
//!   dispatch slots are spaced `1 / requests_per_second` apart.
//! - Per domain: two dispatches to the same domain are at least the domain's
//!   effective delay apart (configured delay, robots.txt crawl-delay, and any
//!   429 penalty).
//!
//! Waiting is a timed sleep for exactly the remaining duration. The slot is
//! reserved under the lock before sleeping, so concurrent callers for one
//! domain queue up behind each other instead of racing.

use crate::config::CrawlerConfig;
use crate::state::DomainBucket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct LimiterState {
    domains: HashMap<String, DomainBucket>,
    global_last: Option<Instant>,
}

type SharedState = Arc<Mutex<LimiterState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, LimiterState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gate that every fetch attempt passes through
#[derive(Debug)]
pub struct RateLimiter {
    per_domain_delay: Duration,
    global_interval: Duration,
    max_in_flight: usize,
    semaphore: Arc<Semaphore>,
    state: SharedState,
}

/// Proof that a request may be dispatched
///
/// Holds one unit of the global in-flight budget. Dropping it releases the
/// budget and the domain's in-flight count.
#[derive(Debug)]
pub struct DispatchPermit {
    domain: String,
    scheduled_at: Instant,
    state: SharedState,
    _permit: OwnedSemaphorePermit,
}

impl DispatchPermit {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The reserved dispatch slot
    pub fn scheduled_at(&self) -> Instant {
        self.scheduled_at
    }
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        if let Some(bucket) = lock(&self.state).domains.get_mut(&self.domain) {
            bucket.finish_request();
        }
    }
}

impl RateLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Overall rate budget across all domains (> 0)
    /// * `per_domain_delay` - Minimum spacing between requests to one domain
    pub fn new(requests_per_second: f64, per_domain_delay: Duration) -> Self {
        // Two seconds worth of requests may be in flight at once
        let max_in_flight = (requests_per_second * 2.0).ceil().max(1.0) as usize;
        let global_interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            per_domain_delay,
            global_interval,
            max_in_flight,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            state: Arc::new(Mutex::new(LimiterState::default())),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.requests_per_second, config.per_domain_delay())
    }

    /// Waits until a request to `domain` may be dispatched
    ///
    /// Returns an error only if the limiter was closed while waiting.
    /// Dropping the returned future before it completes gives back both the
    /// global permit and the domain's in-flight slot.
    pub async fn acquire(&self, domain: &str) -> Result<DispatchPermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;

        let slot = {
            let mut state = lock(&self.state);
            let now = Instant::now();

            let global_slot = match state.global_last {
                Some(last) if last + self.global_interval > now => last + self.global_interval,
                _ => now,
            };
            state.global_last = Some(global_slot);

            let bucket = state.domains.entry(domain.to_string()).or_default();
            let slot = bucket.reserve(self.per_domain_delay, global_slot);
            bucket.begin_request();
            slot
        };

        let dispatch = DispatchPermit {
            domain: domain.to_string(),
            scheduled_at: slot,
            state: Arc::clone(&self.state),
            _permit: permit,
        };

        if slot > Instant::now() {
            tracing::trace!(
                domain,
                delay_ms = (slot - Instant::now()).as_millis() as u64,
                "Waiting for dispatch slot"
            );
            tokio::time::sleep_until(slot).await;
        }

        Ok(dispatch)
    }

    /// Applies a robots.txt crawl-delay to a domain
    pub fn set_crawl_delay(&self, domain: &str, crawl_delay: Option<Duration>) {
        let mut state = lock(&self.state);
        state.domains.entry(domain.to_string()).or_default().crawl_delay = crawl_delay;
    }

    /// Lengthens the delay of a domain that answered 429
    pub fn penalize(&self, domain: &str) {
        let mut state = lock(&self.state);
        let bucket = state.domains.entry(domain.to_string()).or_default();
        bucket.mark_rate_limited();
        tracing::warn!(
            domain,
            delay_ms = bucket.effective_delay(self.per_domain_delay).as_millis() as u64,
            "Domain is rate limiting, delay lengthened"
        );
    }

    /// Removes the 429 penalty of a domain after a successful response
    pub fn reset_penalty(&self, domain: &str) {
        if let Some(bucket) = lock(&self.state).domains.get_mut(domain) {
            bucket.clear_rate_limit();
        }
    }

    /// Effective spacing currently applied to `domain`
    pub fn delay_for(&self, domain: &str) -> Duration {
        lock(&self.state)
            .domains
            .get(domain)
            .map(|bucket| bucket.effective_delay(self.per_domain_delay))
            .unwrap_or(self.per_domain_delay)
    }

    /// Snapshot of a domain's bucket
    pub fn bucket(&self, domain: &str) -> Option<DomainBucket> {
        lock(&self.state).domains.get(domain).cloned()
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.semaphore.available_permits()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Rejects every pending and future `acquire`
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(10.0, Duration::from_secs(1));
        let start = Instant::now();

        let _permit = limiter.acquire("example.com").await.unwrap();
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_acquires_respect_domain_delay() {
        let limiter = RateLimiter::new(100.0, Duration::from_millis(1000));
        let mut times = Vec::new();

        for _ in 0..5 {
            let permit = limiter.acquire("example.com").await.unwrap();
            times.push(Instant::now());
            drop(permit);
        }

        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_on_one_domain_are_spaced() {
        let limiter = Arc::new(RateLimiter::new(100.0, Duration::from_millis(500)));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    let _permit = limiter.acquire("example.com").await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_domains_are_not_delayed() {
        let limiter = RateLimiter::new(1000.0, Duration::from_secs(5));
        let start = Instant::now();

        let _a = limiter.acquire("a.test").await.unwrap();
        let _b = limiter.acquire("b.test").await.unwrap();

        assert!(Instant::now() - start < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_delay_lengthens_spacing() {
        let limiter = RateLimiter::new(100.0, Duration::from_millis(100));
        limiter.set_crawl_delay("example.com", Some(Duration::from_secs(2)));

        let first = limiter.acquire("example.com").await.unwrap().scheduled_at();
        let second = limiter.acquire("example.com").await.unwrap().scheduled_at();

        assert_eq!(second - first, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalty_and_reset() {
        let limiter = RateLimiter::new(100.0, Duration::from_millis(100));

        limiter.penalize("example.com");
        assert_eq!(limiter.delay_for("example.com"), Duration::from_millis(1100));

        limiter.reset_penalty("example.com");
        assert_eq!(limiter.delay_for("example.com"), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_in_flight_cap() {
        let limiter = RateLimiter::new(1.0, Duration::ZERO);
        assert_eq!(limiter.max_in_flight(), 2);

        let a = limiter.acquire("a.test").await.unwrap();
        let _b = limiter.acquire("b.test").await.unwrap();
        assert_eq!(limiter.in_flight(), 2);

        let blocked =
            tokio::time::timeout(Duration::from_secs(60), limiter.acquire("c.test")).await;
        assert!(blocked.is_err());

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.acquire("c.test").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_rate_spacing() {
        let limiter = RateLimiter::new(2.0, Duration::ZERO);

        let first = limiter.acquire("a.test").await.unwrap().scheduled_at();
        let second = limiter.acquire("b.test").await.unwrap().scheduled_at();

        assert_eq!(second - first, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_released_on_drop() {
        let limiter = RateLimiter::new(10.0, Duration::ZERO);

        let permit = limiter.acquire("example.com").await.unwrap();
        assert_eq!(limiter.bucket("example.com").unwrap().in_flight, 1);

        drop(permit);
        assert_eq!(limiter.bucket("example.com").unwrap().in_flight, 0);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects_acquire() {
        let limiter = RateLimiter::new(10.0, Duration::ZERO);
        limiter.close();
        assert!(limiter.acquire("example.com").await.is_err());
    }
}

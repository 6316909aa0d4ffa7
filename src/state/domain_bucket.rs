use std::time::Duration;
use tokio::time::Instant;

/// Extra delay added by the first 429 from a domain; doubles per repeat
const RATE_LIMIT_PENALTY: Duration = Duration::from_secs(1);

/// Cap on the number of doublings of the 429 penalty (1s .. 64s)
const MAX_BACKOFF_LEVEL: u32 = 6;

/// Tracks the politeness state of a domain during crawling
///
/// The rate limiter keeps one bucket per domain. The invariant it maintains is
/// that two dispatch slots handed out for the same domain are at least
/// `effective_delay` apart.
#[derive(Debug, Clone, Default)]
pub struct DomainBucket {
    /// Time of the latest reserved dispatch slot (may lie in the future)
    pub last_dispatch: Option<Instant>,

    /// Requests to this domain currently being fetched
    pub in_flight: u32,

    /// Number of dispatch slots handed out for this domain
    pub dispatch_count: u64,

    /// Crawl-delay declared by the domain's robots.txt
    pub crawl_delay: Option<Duration>,

    /// Number of consecutive 429 responses seen from this domain
    pub backoff_level: u32,
}

impl DomainBucket {
    /// Creates a new DomainBucket with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the minimum spacing between two dispatches to this domain
    ///
    /// This is `max(base_delay, crawl_delay)` plus the 429 penalty, if any.
    pub fn effective_delay(&self, base_delay: Duration) -> Duration {
        let delay = match self.crawl_delay {
            Some(crawl_delay) => base_delay.max(crawl_delay),
            None => base_delay,
        };

        delay + self.penalty()
    }

    fn penalty(&self) -> Duration {
        if self.backoff_level == 0 {
            Duration::ZERO
        } else {
            RATE_LIMIT_PENALTY * 2u32.pow(self.backoff_level - 1)
        }
    }

    /// Earliest instant a new dispatch to this domain is allowed
    pub fn next_eligible(&self, base_delay: Duration) -> Option<Instant> {
        self.last_dispatch
            .map(|last| last + self.effective_delay(base_delay))
    }

    /// Checks if a request can be dispatched to this domain at `now`
    pub fn can_dispatch(&self, base_delay: Duration, now: Instant) -> bool {
        self.time_until_next_dispatch(base_delay, now).is_none()
    }

    /// Calculates the time until the next dispatch is allowed
    ///
    /// Returns None if a dispatch can be made now, or the duration to wait otherwise.
    pub fn time_until_next_dispatch(&self, base_delay: Duration, now: Instant) -> Option<Duration> {
        let eligible = self.next_eligible(base_delay)?;
        if eligible > now {
            Some(eligible - now)
        } else {
            None
        }
    }

    /// Reserves the next dispatch slot and returns its instant
    ///
    /// The slot is `now` if the domain is eligible, otherwise the earliest
    /// eligible instant. Reserving moves `last_dispatch` to the slot, so the
    /// next caller is spaced after it even before this one wakes up.
    pub fn reserve(&mut self, base_delay: Duration, now: Instant) -> Instant {
        let slot = match self.next_eligible(base_delay) {
            Some(eligible) if eligible > now => eligible,
            _ => now,
        };

        self.last_dispatch = Some(slot);
        self.dispatch_count += 1;
        slot
    }

    /// Records that a request to this domain started fetching
    pub fn begin_request(&mut self) {
        self.in_flight += 1;
    }

    /// Records that a request to this domain finished
    pub fn finish_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Lengthens the domain's delay after a 429 response
    pub fn mark_rate_limited(&mut self) {
        self.backoff_level = (self.backoff_level + 1).min(MAX_BACKOFF_LEVEL);
    }

    /// Clears the 429 penalty (e.g., after a successful response)
    pub fn clear_rate_limit(&mut self) {
        self.backoff_level = 0;
    }

    /// Returns true if the domain currently carries a 429 penalty
    pub fn is_rate_limited(&self) -> bool {
        self.backoff_level > 0
    }
}

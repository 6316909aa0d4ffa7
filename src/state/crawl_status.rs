/// Terminal status definitions for crawled pages
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one fetch+parse cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Page was fetched and parsed
    Completed,

    /// Fetch or parse failed (after retries, where retriable)
    Failed,

    /// Page was not fetched: robots.txt, scope, or non-HTML content
    Skipped,

    /// Server kept answering 429 until retries ran out
    RateLimited,
}

impl CrawlStatus {
    pub const ALL: [CrawlStatus; 4] = [
        Self::Completed,
        Self::Failed,
        Self::Skipped,
        Self::RateLimited,
    ];

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::RateLimited)
    }

    /// Converts the status to its storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Parses a status from its storage representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. The crawler consults a `RobotsPolicy` before every
//! fetch; a missing or unreachable robots.txt allows everything.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use crate::url::extract_domain;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Politeness policy consulted before each fetch
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    /// Returns true if `user_agent` may fetch `url`
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool;

    /// Crawl delay requested for `domain`, if any
    async fn crawl_delay(&self, domain: &str) -> Option<Duration>;
}

/// Policy that allows every URL and requests no delay
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllRobots;

#[async_trait]
impl RobotsPolicy for AllowAllRobots {
    async fn is_allowed(&self, _url: &Url, _user_agent: &str) -> bool {
        true
    }

    async fn crawl_delay(&self, _domain: &str) -> Option<Duration> {
        None
    }
}

/// Fetches robots.txt over HTTP and caches it per origin
///
/// Entries are refetched once stale. Concurrent first visits to one domain
/// may fetch the file twice; the last fetch wins.
#[derive(Debug)]
pub struct HttpRobotsPolicy {
    client: Client,
    agent_token: String,
    cache: RobotsCache,
}

impl HttpRobotsPolicy {
    /// Creates a policy
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for robots.txt requests
    /// * `agent_token` - Product token matched against `Crawl-delay` groups
    pub fn new(client: Client, agent_token: impl Into<String>) -> Self {
        Self {
            client,
            agent_token: agent_token.into(),
            cache: RobotsCache::new(),
        }
    }

    /// Returns the robots.txt rules covering `url`, fetching them if needed
    pub async fn robots_for(&self, url: &Url) -> ParsedRobots {
        let Some(domain) = extract_domain(url) else {
            return ParsedRobots::allow_all();
        };
        let origin = url.origin().ascii_serialization();

        if let Some(robots) = self.cache.get(&origin) {
            return robots;
        }

        let robots = fetch_robots(&self.client, url).await;
        self.cache.insert(origin, domain, robots.clone());
        robots
    }

    /// Number of origins with a cached robots.txt
    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl RobotsPolicy for HttpRobotsPolicy {
    async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        self.robots_for(url).await.is_allowed(url.as_str(), user_agent)
    }

    async fn crawl_delay(&self, domain: &str) -> Option<Duration> {
        self.cache
            .latest_for_host(domain)
            .and_then(|robots| robots.crawl_delay(&self.agent_token))
    }
}

/// Location of the robots.txt file governing `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    if robots.host_str().is_some() {
        Some(robots)
    } else {
        None
    }
}

/// Fetches robots.txt for the site of `url`
///
/// Anything but a successful response (404, server error, network failure)
/// yields a permissive policy.
pub async fn fetch_robots(client: &Client, url: &Url) -> ParsedRobots {
    let Some(robots_url) = robots_url(url) else {
        return ParsedRobots::allow_all();
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "robots.txt unreachable, allowing all");
            return ParsedRobots::allow_all();
        }
    };

    if response.status() != StatusCode::OK {
        tracing::debug!(url = %robots_url, status = response.status().as_u16(), "No robots.txt");
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(body) => ParsedRobots::from_content(&body),
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "Failed to read robots.txt");
            ParsedRobots::allow_all()
        }
    }
}

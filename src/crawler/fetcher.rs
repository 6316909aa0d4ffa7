//! Fetch strategies
//!
//! This module turns a URL into a page payload:
//! - `StaticFetcher`: a plain HTTP GET with bounded redirects and a timeout
//! - `DynamicFetcher`: delegates script rendering to an external rendering
//!   service and returns the rendered document
//! - `FetchRouter`: picks the strategy for each URL
//!
//! Both strategies report failures as a typed `FetchError`; retrying is the
//! worker's job, not the fetcher's.

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::FetchError;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use reqwest::{header, redirect::Policy, Client, Response};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Response header a rendering service may use to report the final URL
const RENDER_FINAL_URL_HEADER: &str = "x-final-url";

/// Raw page returned by a fetch strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,

    pub status_code: u16,

    /// Content-Type header value, if the server sent one
    pub content_type: Option<String>,

    pub body: String,
}

impl FetchedPage {
    /// Returns true if the content can be handed to the HTML parser
    ///
    /// A missing Content-Type is given the benefit of the doubt.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(content_type) => {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("text/html")
                    || content_type.contains("application/xhtml+xml")
            }
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Capability for turning a URL into a page payload
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Performs one fetch attempt
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Timeout and redirect settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(crawler.request_timeout())
        .connect_timeout(crawler.request_timeout().min(Duration::from_secs(10)))
        .redirect(Policy::limited(crawler.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with a plain HTTP GET
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    client: Client,
}

impl StaticFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent, crawler)?))
    }
}

#[async_trait]
impl FetchStrategy for StaticFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let final_url = response.url().clone();
        read_page(response, final_url).await
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Fetches pages through an external rendering service
///
/// The service receives `GET {endpoint}?url=<page>&wait=<milliseconds>` and
/// answers with the rendered HTML. Its own error statuses are reported as
/// `FetchError::Render` (5xx) or passed through as HTTP errors (4xx).
#[derive(Debug, Clone)]
pub struct DynamicFetcher {
    client: Client,
    endpoint: Url,
    wait_time: Duration,
}

impl DynamicFetcher {
    pub fn new(client: Client, endpoint: Url, wait_time: Duration) -> Self {
        Self {
            client,
            endpoint,
            wait_time,
        }
    }

    /// Builds a dynamic fetcher from configuration
    ///
    /// Returns `Ok(None)` when no render endpoint is configured.
    pub fn from_config(
        user_agent: &UserAgentConfig,
        crawler: &CrawlerConfig,
    ) -> Result<Option<Self>, crate::SumiError> {
        let Some(endpoint) = &crawler.render_endpoint else {
            return Ok(None);
        };

        let endpoint = Url::parse(endpoint).map_err(|e| {
            crate::ConfigError::InvalidUrl(format!("render endpoint {}: {}", endpoint, e))
        })?;

        // Rendering takes the page timeout plus the settle time
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .timeout(crawler.request_timeout() + crawler.dynamic_wait_time())
            .build()?;

        Ok(Some(Self::new(client, endpoint, crawler.dynamic_wait_time())))
    }

    fn render_url(&self, url: &Url) -> Url {
        let mut render_url = self.endpoint.clone();
        render_url
            .query_pairs_mut()
            .append_pair("url", url.as_str())
            .append_pair("wait", &self.wait_time.as_millis().to_string());
        render_url
    }
}

#[async_trait]
impl FetchStrategy for DynamicFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(self.render_url(url))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(FetchError::Render(format!(
                "rendering service answered HTTP {}",
                status
            )));
        }

        let final_url = response
            .headers()
            .get(RENDER_FINAL_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Url::parse(v).ok())
            .unwrap_or_else(|| url.clone());

        read_page(response, final_url).await
    }

    fn name(&self) -> &'static str {
        "dynamic"
    }
}

async fn read_page(response: Response, final_url: Url) -> Result<FetchedPage, FetchError> {
    let status_code = response.status().as_u16();
    if let Some(error) = FetchError::from_status(status_code) {
        return Err(error);
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Body(e.to_string()))?;

    Ok(FetchedPage {
        final_url,
        status_code,
        content_type,
        body,
    })
}

/// Chooses the fetch strategy for each URL
///
/// The dynamic strategy is used when it is configured and the URL matches
/// one of the dynamic patterns (or every URL, if there are none).
#[derive(Clone)]
pub struct FetchRouter {
    static_fetcher: Arc<dyn FetchStrategy>,
    dynamic_fetcher: Option<Arc<dyn FetchStrategy>>,
    dynamic_patterns: Vec<Regex>,
}

impl FetchRouter {
    pub fn new(static_fetcher: Arc<dyn FetchStrategy>) -> Self {
        Self {
            static_fetcher,
            dynamic_fetcher: None,
            dynamic_patterns: Vec::new(),
        }
    }

    /// Routes matching URLs to `dynamic_fetcher`
    ///
    /// Patterns are matched case-insensitively anywhere in the URL.
    pub fn with_dynamic(
        mut self,
        dynamic_fetcher: Arc<dyn FetchStrategy>,
        patterns: &[String],
    ) -> Result<Self, regex::Error> {
        self.dynamic_patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<_, _>>()?;
        self.dynamic_fetcher = Some(dynamic_fetcher);
        Ok(self)
    }

    pub fn select(&self, url: &Url) -> &dyn FetchStrategy {
        match &self.dynamic_fetcher {
            Some(dynamic)
                if self.dynamic_patterns.is_empty()
                    || self.dynamic_patterns.iter().any(|p| p.is_match(url.as_str())) =>
            {
                dynamic.as_ref()
            }
            _ => self.static_fetcher.as_ref(),
        }
    }
}

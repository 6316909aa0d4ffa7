//! Crawler coordinator - run lifecycle
//!
//! `WebCrawler` owns the configuration and the collaborators of a crawl. A
//! run goes through four phases:
//! - INIT: normalize seeds, build the frontier, rate limiter and statistics
//! - RUNNING: `num_workers` workers race to pop from the frontier
//! - DRAINING: a stop condition fired; in-flight pages finish, their links
//!   are dropped
//! - DONE: storage is flushed and a `CrawlSummary` is returned

use crate::config::{validate, validate_seeds, Config};
use crate::crawler::fetcher::{
    build_http_client, DynamicFetcher, FetchRouter, FetchStrategy, StaticFetcher,
};
use crate::crawler::links::LinkFilter;
use crate::crawler::parser::{Extractor, HtmlParser, Parser};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::stats::{CrawlStats, CrawlSummary, StopReason};
use crate::crawler::worker::{run_worker, CrawlContext, PageCallback, RunControl, SharedStorage};
use crate::frontier::{
    CrawlScope, Frontier, MemoryFrontier, RedisStore, SharedFrontier, SharedStore,
};
use crate::model::{CrawlRequest, CrawlResult};
use crate::robots::{HttpRobotsPolicy, RobotsPolicy};
use crate::storage::{open_storage, Storage};
use crate::url::normalize_url;
use crate::{ConfigError, SumiError};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Store round trips attempted when no `[shared-frontier]` section says otherwise
const DEFAULT_STORE_ATTEMPTS: u32 = 5;

/// The crawl orchestrator
///
/// Collaborators not supplied through the builder methods are created from
/// the configuration when a crawl starts.
///
/// # Example
///
/// ```no_run
/// use sumi_crawl::config::Config;
/// use sumi_crawl::WebCrawler;
///
/// # async fn run(config: Config) -> Result<(), sumi_crawl::SumiError> {
/// let mut crawler = WebCrawler::new(config)?;
/// let summary = crawler.crawl(&["https://example.com/".to_string()]).await?;
/// println!("{} pages crawled", summary.total_pages_crawled);
/// # Ok(())
/// # }
/// ```
pub struct WebCrawler {
    config: Config,
    fetcher: Option<Arc<dyn FetchStrategy>>,
    dynamic_fetcher: Option<Arc<dyn FetchStrategy>>,
    parser: Option<Arc<dyn Parser>>,
    extractors: Vec<Box<dyn Extractor>>,
    robots: Option<Arc<dyn RobotsPolicy>>,
    storage: Option<SharedStorage>,
    shared_store: Option<Arc<dyn SharedStore>>,
    on_page: Option<PageCallback>,
}

impl WebCrawler {
    /// Creates a crawler after validating the configuration
    pub fn new(config: Config) -> Result<Self, SumiError> {
        validate(&config)?;

        Ok(Self {
            config,
            fetcher: None,
            dynamic_fetcher: None,
            parser: None,
            extractors: Vec::new(),
            robots: None,
            storage: None,
            shared_store: None,
            on_page: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the static fetch strategy
    pub fn with_fetcher(mut self, fetcher: Arc<dyn FetchStrategy>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replaces the dynamic fetch strategy (used only with `enable-dynamic`)
    pub fn with_dynamic_fetcher(mut self, fetcher: Arc<dyn FetchStrategy>) -> Self {
        self.dynamic_fetcher = Some(fetcher);
        self
    }

    /// Replaces the HTML parser; registered extractors are then ignored
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Registers an extra extractor on the default parser
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Replaces the robots policy (consulted only with `respect-robots`)
    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    /// Replaces the storage backend selected by `[output]`
    pub fn with_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.storage = Some(Arc::new(Mutex::new(storage)));
        self
    }

    /// Uses `store` for the shared frontier instead of connecting to Redis
    pub fn with_shared_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.shared_store = Some(store);
        self
    }

    /// Calls `callback` with every terminal result
    pub fn on_page_crawled<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CrawlResult) + Send + Sync + 'static,
    {
        self.on_page = Some(Arc::new(callback));
        self
    }

    /// Crawls from `seeds` until a stop condition fires
    ///
    /// An empty `seeds` falls back to the seeds of the configuration.
    pub async fn crawl(&mut self, seeds: &[String]) -> Result<CrawlSummary, SumiError> {
        self.crawl_with_cancellation(seeds, CancellationToken::new())
            .await
    }

    /// Crawls from `seeds`, stopping early when `cancel` fires
    ///
    /// Cancellation lets in-flight fetches finish; requests still waiting
    /// for a dispatch slot are abandoned without a result.
    pub async fn crawl_with_cancellation(
        &mut self,
        seeds: &[String],
        cancel: CancellationToken,
    ) -> Result<CrawlSummary, SumiError> {
        let started_at = Utc::now();
        let seeds = self.seed_urls(seeds)?;
        let crawler = Arc::new(self.config.crawler.clone());

        tracing::info!(
            seeds = seeds.len(),
            max_depth = crawler.max_depth,
            max_pages = crawler.max_pages,
            workers = crawler.num_workers,
            "Starting crawl"
        );

        let scope = CrawlScope::from_config(&crawler, &seeds);
        let links = LinkFilter::new(scope.clone(), &crawler.excluded_patterns)
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
        let frontier = self.build_frontier(scope).await?;

        for seed in &seeds {
            if !frontier.push(CrawlRequest::seed(seed.clone())).await? {
                tracing::warn!(url = %seed, "Seed not enqueued (duplicate or outside allowed domains)");
            }
        }

        let cancel = cancel.child_token();
        let ctx = Arc::new(CrawlContext {
            config: Arc::clone(&crawler),
            robots_agent: self.config.user_agent.crawler_name.clone(),
            frontier,
            rate_limiter: Arc::new(RateLimiter::from_config(&crawler)),
            retry: RetryPolicy::from_config(&crawler),
            fetchers: self.build_fetchers()?,
            parser: self.parser(),
            robots: self.robots_policy()?,
            storage: self.storage()?,
            links,
            stats: Arc::new(CrawlStats::new()),
            store_raw_html: self.config.output.store_raw_html,
            on_page: self.on_page.clone(),
            cancel: cancel.clone(),
            control: RunControl::default(),
        });

        let timer = ctx.config.crawl_timeout_secs.map(|secs| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                tracing::info!(timeout_secs = secs, "Crawl timeout reached");
                cancel.cancel();
            })
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..ctx.config.num_workers {
            workers.spawn(run_worker(Arc::clone(&ctx), worker_id));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        ctx.rate_limiter.close();

        {
            let mut storage = ctx.storage.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = storage.flush() {
                tracing::error!(backend = storage.backend_name(), error = %e, "Failed to flush storage");
            }
        }

        if let Some(error) = ctx.control.take_fatal() {
            return Err(error.into());
        }

        let stop_reason = ctx
            .control
            .stop_reason()
            .await
            .unwrap_or(StopReason::FrontierExhausted);
        let summary = ctx.stats.summarize(started_at, Utc::now(), stop_reason);

        tracing::info!(
            pages = summary.total_pages_crawled,
            failed = summary.total_failed,
            skipped = summary.total_skipped,
            rate_limited = summary.total_rate_limited,
            elapsed_secs = summary.elapsed_seconds,
            reason = %stop_reason,
            "Crawl finished"
        );

        Ok(summary)
    }

    fn seed_urls(&self, seeds: &[String]) -> Result<Vec<Url>, SumiError> {
        let seeds = if seeds.is_empty() {
            &self.config.seeds
        } else {
            seeds
        };

        if seeds.is_empty() {
            return Err(ConfigError::Validation("at least one seed URL is required".to_string()).into());
        }
        validate_seeds(seeds)?;

        let urls = seeds
            .iter()
            .map(|seed| {
                normalize_url(seed)
                    .map_err(|e| ConfigError::InvalidUrl(format!("seed {}: {}", seed, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    async fn build_frontier(&self, scope: CrawlScope) -> Result<Arc<dyn Frontier>, SumiError> {
        if !self.config.crawler.use_shared_frontier {
            return Ok(Arc::new(MemoryFrontier::new(scope)));
        }

        let shared = self.config.shared_frontier.as_ref();
        let attempts = shared
            .map(|s| s.max_store_retries)
            .unwrap_or(DEFAULT_STORE_ATTEMPTS);

        let store: Arc<dyn SharedStore> = match (&self.shared_store, shared) {
            (Some(store), _) => Arc::clone(store),
            (None, Some(shared)) => {
                tracing::info!(prefix = %shared.key_prefix, "Connecting to shared frontier");
                Arc::new(RedisStore::connect(&shared.redis_url, &shared.key_prefix).await?)
            }
            (None, None) => {
                return Err(ConfigError::Validation(
                    "use-shared-frontier requires a [shared-frontier] section".to_string(),
                )
                .into())
            }
        };

        Ok(Arc::new(SharedFrontier::new(store, scope, attempts)))
    }

    fn build_fetchers(&self) -> Result<FetchRouter, SumiError> {
        let crawler = &self.config.crawler;

        let static_fetcher: Arc<dyn FetchStrategy> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(StaticFetcher::from_config(&self.config.user_agent, crawler)?),
        };
        let router = FetchRouter::new(static_fetcher);

        if !crawler.enable_dynamic {
            return Ok(router);
        }

        let dynamic: Option<Arc<dyn FetchStrategy>> = match &self.dynamic_fetcher {
            Some(fetcher) => Some(Arc::clone(fetcher)),
            None => DynamicFetcher::from_config(&self.config.user_agent, crawler)?
                .map(|f| Arc::new(f) as Arc<dyn FetchStrategy>),
        };

        match dynamic {
            Some(dynamic) => Ok(router
                .with_dynamic(dynamic, &crawler.dynamic_patterns)
                .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?),
            None => {
                tracing::warn!("Dynamic fetching enabled without a render endpoint, using static fetches");
                Ok(router)
            }
        }
    }

    fn parser(&mut self) -> Arc<dyn Parser> {
        if let Some(parser) = &self.parser {
            return Arc::clone(parser);
        }

        let parser = self
            .extractors
            .drain(..)
            .fold(HtmlParser::new(), HtmlParser::with_extractor);
        let parser: Arc<dyn Parser> = Arc::new(parser);
        self.parser = Some(Arc::clone(&parser));
        parser
    }

    fn robots_policy(&mut self) -> Result<Option<Arc<dyn RobotsPolicy>>, SumiError> {
        if !self.config.crawler.respect_robots {
            return Ok(None);
        }

        if let Some(robots) = &self.robots {
            return Ok(Some(Arc::clone(robots)));
        }

        let client = build_http_client(&self.config.user_agent, &self.config.crawler)?;
        let robots: Arc<dyn RobotsPolicy> = Arc::new(HttpRobotsPolicy::new(
            client,
            self.config.user_agent.crawler_name.clone(),
        ));
        self.robots = Some(Arc::clone(&robots));
        Ok(Some(robots))
    }

    fn storage(&mut self) -> Result<SharedStorage, SumiError> {
        if let Some(storage) = &self.storage {
            return Ok(Arc::clone(storage));
        }

        let storage = Arc::new(Mutex::new(open_storage(&self.config.output)?));
        self.storage = Some(Arc::clone(&storage));
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlerConfig;
    use crate::storage::MemoryStorage;

    fn create_test_config() -> Config {
        Config {
            seeds: vec![],
            crawler: CrawlerConfig {
                respect_robots: false,
                ..Default::default()
            },
            user_agent: Default::default(),
            output: Default::default(),
            shared_frontier: None,
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = create_test_config();
        config.crawler.num_workers = 0;
        assert!(matches!(
            WebCrawler::new(config),
            Err(SumiError::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_crawl_without_seeds_fails() {
        let mut crawler = WebCrawler::new(create_test_config())
            .unwrap()
            .with_storage(Box::new(MemoryStorage::new()));

        let result = crawler.crawl(&[]).await;
        assert!(matches!(
            result,
            Err(SumiError::Config(ConfigError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_invalid_seed_fails() {
        let mut crawler = WebCrawler::new(create_test_config())
            .unwrap()
            .with_storage(Box::new(MemoryStorage::new()));

        let result = crawler.crawl(&["ftp://example.com/".to_string()]).await;
        assert!(matches!(
            result,
            Err(SumiError::Config(ConfigError::InvalidUrl(_)))
        ));
    }

    #[test]
    fn test_seed_urls_fall_back_to_config() {
        let mut config = create_test_config();
        config.seeds = vec!["https://Example.com/a/#top".to_string()];
        let crawler = WebCrawler::new(config).unwrap();

        let seeds = crawler.seed_urls(&[]).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].as_str(), "https://example.com/a");
    }

    struct NoopExtractor;

    impl Extractor for NoopExtractor {
        fn name(&self) -> &str {
            "noop"
        }

        fn extract(
            &self,
            _document: &scraper::Html,
            _url: &Url,
        ) -> Result<serde_json::Map<String, serde_json::Value>, crate::ParseError> {
            Ok(serde_json::Map::new())
        }
    }

    #[test]
    fn test_default_parser_is_built_once() {
        let mut crawler = WebCrawler::new(create_test_config())
            .unwrap()
            .with_extractor(Box::new(NoopExtractor));
        assert_eq!(crawler.extractors.len(), 1);

        let first = crawler.parser();
        assert!(crawler.extractors.is_empty());

        let second = crawler.parser();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

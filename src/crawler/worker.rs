//! Worker tasks
//!
//! Every worker pulls from the shared frontier until the run stops. All
//! stop decisions are taken under one dispatch lock, so "frontier empty and
//! nothing in flight" and the page budget are never judged on stale counts.
//! The lock only reserves a pop; the pop itself runs outside it.
//!
//! Per request: scope recheck, robots policy, rate limiter, fetch with
//! retry, parse, link discovery, storage, statistics.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchRouter, FetchedPage};
use crate::crawler::links::LinkFilter;
use crate::crawler::parser::Parser;
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::stats::{CrawlStats, StopReason};
use crate::frontier::{Frontier, FrontierError};
use crate::model::{CrawlRequest, CrawlResult, PageContent};
use crate::robots::RobotsPolicy;
use crate::state::CrawlStatus;
use crate::storage::Storage;
use crate::FetchError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Longest idle wait before an idle worker looks at the frontier again
///
/// Other processes may push to a shared frontier without waking us.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Callback invoked with every terminal result
pub type PageCallback = Arc<dyn Fn(&CrawlResult) + Send + Sync>;

/// Storage shared by the workers of a run
pub type SharedStorage = Arc<Mutex<Box<dyn Storage>>>;

#[derive(Debug, Default)]
struct Dispatch {
    /// Requests popped and still being processed
    in_flight: usize,
    /// Pops issued whose outcome is not known yet
    popping: u64,
    /// Requests popped during this run
    dispatched: u64,
    stop: Option<StopReason>,
}

/// Run-wide stop state
#[derive(Debug, Default)]
pub(crate) struct RunControl {
    dispatch: tokio::sync::Mutex<Dispatch>,
    draining: AtomicBool,
    wakeup: Notify,
    fatal: Mutex<Option<FrontierError>>,
}

impl RunControl {
    fn stop(&self, dispatch: &mut Dispatch, reason: StopReason) {
        if dispatch.stop.is_none() {
            tracing::info!(reason = %reason, in_flight = dispatch.in_flight, "Stop condition reached, draining");
            dispatch.stop = Some(reason);
        }
        self.draining.store(true, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }

    /// Records an unrecoverable frontier error and stops the run
    async fn fail(&self, error: FrontierError) {
        tracing::error!(error = %error, "Frontier unavailable, aborting crawl");
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
        let mut dispatch = self.dispatch.lock().await;
        self.stop(&mut dispatch, StopReason::StoreFailure);
    }

    /// Returns true once any stop condition has fired
    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub(crate) async fn stop_reason(&self) -> Option<StopReason> {
        self.dispatch.lock().await.stop
    }

    pub(crate) fn take_fatal(&self) -> Option<FrontierError> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Everything a worker needs, shared by all workers of one run
pub(crate) struct CrawlContext {
    pub config: Arc<CrawlerConfig>,
    /// Product token matched against robots.txt groups
    pub robots_agent: String,
    pub frontier: Arc<dyn Frontier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub retry: RetryPolicy,
    pub fetchers: FetchRouter,
    pub parser: Arc<dyn Parser>,
    pub robots: Option<Arc<dyn RobotsPolicy>>,
    pub storage: SharedStorage,
    pub links: LinkFilter,
    pub stats: Arc<CrawlStats>,
    pub store_raw_html: bool,
    pub on_page: Option<PageCallback>,
    pub cancel: CancellationToken,
    pub control: RunControl,
}

enum Next {
    Process(CrawlRequest),
    Idle,
    Stop,
}

/// Runs one worker until the crawl stops
pub(crate) async fn run_worker(ctx: Arc<CrawlContext>, worker_id: usize) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        // Registered before any dispatch state is read so no wakeup is missed
        let idle = ctx.control.wakeup.notified();

        let next = next_request(&ctx).await;

        match next {
            Next::Process(request) => {
                if let Some(result) = process(&ctx, request, worker_id).await {
                    finalize(&ctx, result, worker_id).await;
                }

                let mut dispatch = ctx.control.dispatch.lock().await;
                dispatch.in_flight -= 1;
                ctx.control.wakeup.notify_waiters();
            }
            Next::Idle => {
                tokio::select! {
                    _ = idle => {}
                    _ = ctx.cancel.cancelled() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
            }
            Next::Stop => break,
        }
    }

    tracing::debug!(worker_id, "Worker finished");
}

enum Reservation {
    Pop,
    Wait,
    Stop,
}

/// Reserves one pop against the page budget, or decides the run is over
fn reserve(ctx: &CrawlContext, dispatch: &mut Dispatch) -> Reservation {
    if dispatch.stop.is_some() {
        return Reservation::Stop;
    }

    if ctx.cancel.is_cancelled() {
        ctx.control.stop(dispatch, StopReason::Cancelled);
        return Reservation::Stop;
    }

    let max_pages = ctx.config.max_pages;
    if dispatch.dispatched >= max_pages {
        ctx.control.stop(dispatch, StopReason::MaxPagesReached);
        return Reservation::Stop;
    }

    // The last budget units are held by pops that may still come back empty
    if dispatch.dispatched + dispatch.popping >= max_pages {
        return Reservation::Wait;
    }

    dispatch.popping += 1;
    Reservation::Pop
}

async fn next_request(ctx: &CrawlContext) -> Next {
    {
        let mut dispatch = ctx.control.dispatch.lock().await;
        match reserve(ctx, &mut dispatch) {
            Reservation::Pop => {}
            Reservation::Wait => return Next::Idle,
            Reservation::Stop => return Next::Stop,
        }
    }

    let popped = ctx.frontier.pop().await;

    let mut dispatch = ctx.control.dispatch.lock().await;
    dispatch.popping -= 1;

    match popped {
        Ok(Some(request)) => {
            dispatch.dispatched += 1;
            dispatch.in_flight += 1;
            // Drain before processing so this page's links are not pushed
            if dispatch.dispatched >= ctx.config.max_pages {
                ctx.control.stop(&mut dispatch, StopReason::MaxPagesReached);
            }
            Next::Process(request)
        }
        Ok(None) if dispatch.in_flight == 0 && dispatch.popping == 0 => {
            ctx.control.stop(&mut dispatch, StopReason::FrontierExhausted);
            Next::Stop
        }
        // Budget waiters see the returned unit on their next poll
        Ok(None) => Next::Idle,
        Err(error) => {
            tracing::error!(error = %error, "Frontier unavailable, aborting crawl");
            ctx.control
                .fatal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(error);
            ctx.control.stop(&mut dispatch, StopReason::StoreFailure);
            Next::Stop
        }
    }
}

/// Processes one request end to end
///
/// Returns `None` if the request was abandoned by cancellation before any
/// fetch was dispatched.
async fn process(ctx: &CrawlContext, request: CrawlRequest, worker_id: usize) -> Option<CrawlResult> {
    let started = Instant::now();

    if !ctx.links.scope().admits(&request) {
        tracing::debug!(worker_id, url = %request.url, depth = request.depth, "Outside crawl scope");
        return Some(
            CrawlResult::skipped(request, "scope", "outside crawl scope")
                .with_elapsed(started.elapsed()),
        );
    }

    let Some(domain) = request.domain() else {
        return Some(
            CrawlResult::skipped(request, "scope", "URL has no host")
                .with_elapsed(started.elapsed()),
        );
    };

    if let Some(robots) = &ctx.robots {
        if !robots.is_allowed(&request.url, &ctx.robots_agent).await {
            tracing::info!(worker_id, url = %request.url, "Disallowed by robots.txt");
            return Some(
                CrawlResult::skipped(request, "robots", "disallowed by robots.txt")
                    .with_elapsed(started.elapsed()),
            );
        }
        ctx.rate_limiter
            .set_crawl_delay(&domain, robots.crawl_delay(&domain).await);
    }

    let (outcome, retries) = fetch_with_retry(ctx, &request.url, &domain, worker_id).await?;

    let page = match outcome {
        Ok(page) => page,
        Err(error) => {
            tracing::warn!(
                worker_id,
                url = %request.url,
                retries,
                error = %error,
                "Fetch failed"
            );
            return Some(
                CrawlResult::from_fetch_error(request, &error, retries)
                    .with_elapsed(started.elapsed()),
            );
        }
    };

    let result = handle_page(ctx, request, page, retries, worker_id).await;
    Some(result.with_elapsed(started.elapsed()))
}

/// Fetches `url`, retrying retriable failures with exponential backoff
///
/// Returns the terminal outcome and the number of retries performed, or
/// `None` if the run was cancelled while waiting for a dispatch slot.
async fn fetch_with_retry(
    ctx: &CrawlContext,
    url: &Url,
    domain: &str,
    worker_id: usize,
) -> Option<(Result<FetchedPage, FetchError>, u32)> {
    let fetcher = ctx.fetchers.select(url);
    let mut retries = 0;

    loop {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(worker_id, url = %url, "Cancelled before dispatch");
                return None;
            }
            permit = ctx.rate_limiter.acquire(domain) => permit.ok()?,
        };

        tracing::debug!(worker_id, url = %url, attempt = retries + 1, fetcher = fetcher.name(), "Fetching");
        let outcome = fetcher.fetch(url).await;
        drop(permit);

        let error = match outcome {
            Ok(page) => {
                ctx.rate_limiter.reset_penalty(domain);
                return Some((Ok(page), retries));
            }
            Err(error) => error,
        };

        if error == FetchError::RateLimited {
            ctx.rate_limiter.penalize(domain);
        }

        if !error.is_retriable() || !ctx.retry.can_retry(retries) {
            return Some((Err(error), retries));
        }

        let delay = ctx.retry.delay_for(retries);
        tracing::debug!(
            worker_id,
            url = %url,
            attempt = retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after backoff"
        );

        tokio::select! {
            _ = ctx.cancel.cancelled() => return Some((Err(error), retries)),
            _ = tokio::time::sleep(delay) => {}
        }
        retries += 1;
    }
}

/// Turns a fetched page into a result and enqueues its links
async fn handle_page(
    ctx: &CrawlContext,
    request: CrawlRequest,
    page: FetchedPage,
    retries: u32,
    worker_id: usize,
) -> CrawlResult {
    if !page.is_html() {
        let content_type = page.content_type.clone().unwrap_or_default();
        let mut result = CrawlResult::skipped(
            request,
            "content_type",
            format!("unsupported content type: {}", content_type),
        );
        fill_response(&mut result, &page, retries);
        return result;
    }

    let parsed = match ctx.parser.parse(&page.body, &page.final_url) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(worker_id, url = %request.url, error = %e, "Parse failed");
            let mut result = CrawlResult::new(request, CrawlStatus::Failed);
            result.error_kind = Some("parse".to_string());
            result.error = Some(e.to_string());
            fill_response(&mut result, &page, retries);
            return result;
        }
    };

    let links = ctx.links.resolve_all(&page.final_url, &parsed.links);
    let candidates = ctx.links.candidates(&links, request.depth);
    enqueue_links(ctx, &request, candidates, worker_id).await;

    let mut result = CrawlResult::new(request, CrawlStatus::Completed);
    fill_response(&mut result, &page, retries);
    result.links = links;
    result.content = Some(PageContent {
        title: parsed.title,
        text: parsed.text,
        metadata: parsed.metadata,
        raw_html: ctx.store_raw_html.then_some(page.body),
    });
    result
}

fn fill_response(result: &mut CrawlResult, page: &FetchedPage, retries: u32) {
    result.final_url = Some(page.final_url.clone());
    result.status_code = Some(page.status_code);
    result.bytes = page.len() as u64;
    result.retry_count = retries;
}

/// Pushes discovered links unless the run is draining
async fn enqueue_links(ctx: &CrawlContext, parent: &CrawlRequest, candidates: Vec<Url>, worker_id: usize) {
    let total = candidates.len();
    let mut accepted = 0;

    for (index, url) in candidates.into_iter().enumerate() {
        if ctx.control.is_draining() {
            ctx.stats.record_discarded(total - index);
            break;
        }

        match ctx.frontier.push(CrawlRequest::discovered(url, parent)).await {
            Ok(true) => accepted += 1,
            Ok(false) => {}
            Err(error) => {
                ctx.control.fail(error).await;
                break;
            }
        }
    }

    ctx.stats.record_urls_found(accepted);
    tracing::debug!(worker_id, url = %parent.url, candidates = total, accepted, "Links enqueued");
}

/// Persists a result and updates statistics
async fn finalize(ctx: &CrawlContext, result: CrawlResult, worker_id: usize) {
    {
        let mut storage = ctx.storage.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = storage.save(&result) {
            tracing::error!(worker_id, url = %result.url(), error = %e, "Failed to save result");
        }
    }

    let finished = ctx.stats.record(&result);
    tracing::debug!(
        worker_id,
        url = %result.url(),
        status = %result.status,
        elapsed_ms = result.elapsed_ms,
        "Page finished"
    );

    if let Some(on_page) = &ctx.on_page {
        on_page(&result);
    }

    if finished % 10 == 0 {
        let pending = ctx.frontier.size().await.unwrap_or_default();
        tracing::info!(
            "Progress: {} pages finished, {} pending, {} completed",
            finished,
            pending,
            ctx.stats.count(CrawlStatus::Completed)
        );
    }
}

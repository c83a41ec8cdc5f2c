//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates:
//! - Seeding the frontier from the base URL and configured entrypoints
//! - Running page visits concurrently on pooled sessions
//! - Saving rendered pages and captured assets into the mirror tree
//! - Feeding discovered URLs back into the frontier

use crate::config::Config;
use crate::crawler::scheduler::{CrawlTarget, ScheduledVisit, Scheduler};
use crate::discovery::{extract_urls_from_json_bytes, extract_urls_from_text, ExtractLinks};
use crate::mirror::{MirrorWriter, PathResolver, TargetKind, WriteOutcome};
use crate::output::{CrawlStatistics, VisitCounts};
use crate::overlay::SuppressInterference;
use crate::runtime::{Browser, InterceptedResponse, Page};
use crate::session::{SessionLease, SessionPool};
use crate::url::{is_login_url, resolve_candidate, UrlFilter};
use crate::MirrorError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use url::Url;

/// How often one target may be bounced to the login page before it is dropped
const MAX_REQUEUES: u32 = 3;

/// Visits between two progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    base_url: Url,
    filter: UrlFilter,
    scheduler: Scheduler,
    browser: Arc<dyn Browser>,
    stats: CrawlStatistics,
}

/// Everything a running visit needs, shared by all visit tasks
struct VisitContext {
    pool: SessionPool,
    base_url: Url,
    /// Set when pages require a login; landing here means the session expired
    login_path: Option<String>,
    api_path_prefixes: Vec<String>,
    resolver: PathResolver,
    writer: Arc<MirrorWriter>,
    navigation_timeout: Duration,
    network_idle_timeout: Duration,
}

/// What one visit hands back to the coordinator
#[derive(Debug, Default)]
struct VisitReport {
    /// Raw candidate URLs, resolved by the coordinator
    discovered: Vec<String>,

    /// Assets already saved from the page's network traffic
    captured: Vec<Url>,

    /// Target to visit again after its session was invalidated
    requeue: Option<CrawlTarget>,

    counts: VisitCounts,
}

/// Outcome of rendering one page
enum Rendered {
    /// The page was bounced to the login route
    Bounced,

    /// The server answered with an error status
    ErrorStatus(u16),

    Page { html: String, discovered: Vec<String> },
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The mirror configuration
    /// * `browser` - Runtime used to render pages
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Coordinator with a seeded frontier
    /// * `Err(MirrorError)` - The base URL or a link pattern is invalid
    pub fn new(config: Config, browser: Arc<dyn Browser>) -> Result<Self, MirrorError> {
        let base_url = Url::parse(&config.site.base_url)?;
        let filter = UrlFilter::from_config(
            &base_url,
            &config.crawler.include_globs,
            &config.crawler.include_regexes,
            &config.crawler.exclude_globs,
            &config.crawler.exclude_regexes,
        )?;
        let scheduler = Scheduler::new(
            config.crawler.max_concurrent_pages as usize,
            config.crawler.max_targets as usize,
        );

        let mut coordinator = Self {
            config: Arc::new(config),
            base_url,
            filter,
            scheduler,
            browser,
            stats: CrawlStatistics::new(),
        };

        // Seed the frontier
        let seeds: Vec<String> = std::iter::once(coordinator.base_url.to_string())
            .chain(coordinator.config.site.entrypoints.iter().cloned())
            .collect();
        for seed in &seeds {
            if !coordinator.enqueue_candidate(seed) {
                tracing::warn!("Entrypoint {} was not queued", seed);
            }
        }
        tracing::info!("Seeded frontier with {} target(s)", coordinator.scheduler.frontier_size());

        Ok(coordinator)
    }

    /// Gives access to the frontier, e.g. to change the concurrency limit
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Runs the main crawl loop
    ///
    /// This is the core crawling logic that:
    /// 1. Logs the session pool in
    /// 2. Takes targets from the scheduler as concurrency permits free up
    /// 3. Visits each target on a pooled session
    /// 4. Resolves discovered URLs and adds new ones to the frontier
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - The frontier was exhausted
    /// * `Err(MirrorError)` - Authentication failed for every session
    pub async fn run(&mut self) -> Result<CrawlStatistics, MirrorError> {
        tracing::info!("Starting mirror of {}", self.base_url);

        let pool = SessionPool::start(&self.config, self.browser.clone()).await?;
        let ctx = Arc::new(VisitContext {
            pool: pool.clone(),
            base_url: self.base_url.clone(),
            login_path: self
                .config
                .login
                .required
                .then(|| self.config.login.path.clone()),
            api_path_prefixes: self.config.site.api_path_prefixes.clone(),
            resolver: PathResolver::new(),
            writer: Arc::new(MirrorWriter::new(
                &self.config.output.out_dir,
                self.config.crawler.write_attempts,
            )),
            navigation_timeout: Duration::from_millis(self.config.crawler.navigation_timeout),
            network_idle_timeout: Duration::from_millis(self.config.crawler.network_idle_timeout),
        });

        let mut tasks: JoinSet<Result<VisitReport, MirrorError>> = JoinSet::new();
        let mut visits_done = 0u64;
        let start_time = std::time::Instant::now();

        loop {
            if self.scheduler.is_empty() && tasks.is_empty() {
                tracing::info!("Frontier is empty, crawl complete");
                break;
            }

            tokio::select! {
                Some(scheduled) = self.scheduler.next_visit(), if !self.scheduler.is_empty() => {
                    tasks.spawn(visit(Arc::clone(&ctx), scheduled));
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = self.handle_joined(joined) {
                        tasks.shutdown().await;
                        pool.shutdown().await;
                        return Err(e);
                    }

                    visits_done += 1;
                    if visits_done % PROGRESS_INTERVAL == 0 {
                        let rate = visits_done as f64 / start_time.elapsed().as_secs_f64();
                        tracing::info!(
                            "Progress: {} visits, {} pages saved, {} in frontier, {:.2} visits/sec",
                            visits_done,
                            self.stats.pages_saved(),
                            self.scheduler.frontier_size(),
                            rate
                        );
                    }
                }
                else => break,
            }
        }

        pool.shutdown().await;
        self.stats.finish();

        tracing::info!(
            "Mirror completed: {} pages and {} assets saved in {:?}",
            self.stats.pages_saved(),
            self.stats.assets_saved(),
            start_time.elapsed()
        );

        Ok(self.stats.clone())
    }

    /// Folds a finished visit into the crawl state
    fn handle_joined(
        &mut self,
        joined: Result<Result<VisitReport, MirrorError>, JoinError>,
    ) -> Result<(), MirrorError> {
        match joined {
            Ok(Ok(report)) => self.absorb(report),
            Ok(Err(e)) => {
                tracing::error!("Aborting crawl: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Visit task failed: {}", e);
                self.stats.failed += 1;
            }
        }
        Ok(())
    }

    fn absorb(&mut self, report: VisitReport) {
        self.stats += report.counts;

        for url in &report.captured {
            self.scheduler.mark_seen(url);
        }
        if let Some(target) = report.requeue {
            tracing::debug!("Requeueing {} (bounce {})", target.url, target.requeues + 1);
            self.scheduler.requeue(target);
        }
        for raw in &report.discovered {
            self.enqueue_candidate(raw);
        }
    }

    /// Resolves a raw candidate and queues it if it passes every filter
    ///
    /// # Returns
    ///
    /// `true` if a new target was queued
    fn enqueue_candidate(&mut self, raw: &str) -> bool {
        let (url, kind) =
            match resolve_candidate(raw, &self.base_url, &self.config.site.api_path_prefixes) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::trace!("Not queueing {:?}: {}", raw, e);
                    return false;
                }
            };

        if kind == TargetKind::Page {
            if is_login_url(&url, &self.config.login.path) {
                return false;
            }
            if !self.filter.allows(url.as_str()) {
                tracing::trace!("Filtered out {}", url);
                return false;
            }
        }

        let queued = self.scheduler.enqueue(CrawlTarget::new(url, kind));
        if queued {
            self.stats.targets_enqueued += 1;
        }
        queued
    }
}

/// Visits one target while holding its concurrency permit
///
/// Failures other than a closed session pool are logged and counted here, so
/// one broken page never stops the crawl.
async fn visit(ctx: Arc<VisitContext>, scheduled: ScheduledVisit) -> Result<VisitReport, MirrorError> {
    let ScheduledVisit { target, _permit } = scheduled;
    let url = target.url.clone();

    let lease = ctx.pool.acquire().await?;
    let result = match target.kind {
        TargetKind::Page => visit_page(&ctx, lease, target).await,
        TargetKind::Asset => fetch_asset(&ctx, lease, target).await,
    };

    match result {
        Ok(report) => Ok(report),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!("Visit of {} failed: {}", url, e);
            let mut report = VisitReport::default();
            report.counts.failed += 1;
            Ok(report)
        }
    }
}

/// Renders a page, saves it, and collects its links and network traffic
async fn visit_page(
    ctx: &VisitContext,
    lease: SessionLease,
    target: CrawlTarget,
) -> Result<VisitReport, MirrorError> {
    let mut report = VisitReport::default();

    // 1. Open a page that records its network traffic
    let mut page = lease.context().new_page().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    page.on_response(Arc::new(move |response: InterceptedResponse| {
        let _ = tx.send(response);
    }));

    // 2. Render
    let rendered = render_page(ctx, page.as_mut(), &target).await;
    if let Err(e) = page.close().await {
        tracing::debug!("Closing page {} failed: {}", target.url, e);
    }
    drop(page);

    // 3. Hand the session back, or out of rotation if it expired
    let (html, discovered) = match rendered? {
        Rendered::Bounced => {
            ctx.pool.invalidate(lease);
            report.counts.invalidations += 1;
            if target.requeues < MAX_REQUEUES {
                report.requeue = Some(target);
            } else {
                tracing::warn!("Dropping {}: repeatedly sent to the login page", target.url);
                report.counts.failed += 1;
            }
            return Ok(report);
        }
        Rendered::ErrorStatus(status) => {
            ctx.pool.release(lease);
            tracing::debug!("Skipping page {} (HTTP {})", target.url, status);
            report.counts.skipped += 1;
            return Ok(report);
        }
        Rendered::Page { html, discovered } => {
            ctx.pool.release(lease);
            (html, discovered)
        }
    };
    report.discovered = discovered;

    // 4. Save the snapshot
    save(ctx, &target.url, TargetKind::Page, html.into_bytes(), &mut report.counts).await;

    // 5. Save assets seen on the wire and mine Next.js data responses
    let mut traffic = Vec::new();
    while let Ok(response) = rx.try_recv() {
        traffic.push(response);
    }
    for response in traffic {
        capture_response(ctx, response, &mut report).await;
    }

    Ok(report)
}

async fn render_page(
    ctx: &VisitContext,
    page: &mut dyn Page,
    target: &CrawlTarget,
) -> Result<Rendered, MirrorError> {
    let navigation = page.navigate(&target.url, ctx.navigation_timeout).await?;
    let landed = page.url().unwrap_or_else(|| navigation.url.clone());

    if let Some(login_path) = &ctx.login_path {
        if is_login_url(&landed, login_path) {
            tracing::info!("{} redirected to the login page", target.url);
            return Ok(Rendered::Bounced);
        }
    }
    if navigation.status >= 400 {
        return Ok(Rendered::ErrorStatus(navigation.status));
    }

    if let Err(e) = page.wait_for_network_idle(ctx.network_idle_timeout).await {
        tracing::debug!("Network did not go idle on {}: {}", target.url, e);
    }

    // Overlays go before extraction
    if let Err(e) = page.evaluate(&SuppressInterference).await {
        tracing::debug!("Interference suppression failed on {}: {}", target.url, e);
    }

    let mut discovered = match page.evaluate(&ExtractLinks).await {
        Ok(value) => serde_json::from_value::<Vec<String>>(value).unwrap_or_default(),
        Err(e) => {
            tracing::debug!("Link extraction failed on {}: {}", target.url, e);
            Vec::new()
        }
    };

    let html = page.content().await?;
    discovered.extend(extract_urls_from_text(&html));
    if landed != target.url {
        discovered.push(landed.to_string());
    }

    tracing::debug!("Rendered {} ({} candidates)", target.url, discovered.len());
    Ok(Rendered::Page { html, discovered })
}

/// Fetches an asset target on the lease's session and saves it
async fn fetch_asset(
    ctx: &VisitContext,
    lease: SessionLease,
    target: CrawlTarget,
) -> Result<VisitReport, MirrorError> {
    let mut report = VisitReport::default();
    let fetched = lease.context().fetch(&target.url, ctx.navigation_timeout).await;

    let response = match fetched {
        Ok(response) => response,
        Err(e) => {
            ctx.pool.release(lease);
            return Err(e.into());
        }
    };

    if let Some(login_path) = &ctx.login_path {
        if is_login_url(&response.url, login_path) {
            ctx.pool.invalidate(lease);
            report.counts.invalidations += 1;
            if target.requeues < MAX_REQUEUES {
                report.requeue = Some(target);
            } else {
                report.counts.failed += 1;
            }
            return Ok(report);
        }
    }
    ctx.pool.release(lease);

    if !response.is_success() {
        tracing::debug!("Skipping asset {} (HTTP {})", target.url, response.status);
        report.counts.skipped += 1;
        return Ok(report);
    }
    if response.body.is_empty() {
        tracing::debug!("Skipping asset {} (empty body)", target.url);
        report.counts.skipped += 1;
        return Ok(report);
    }

    if is_next_data(target.url.path()) {
        report
            .discovered
            .extend(extract_urls_from_json_bytes(&response.body));
    }
    save(ctx, &target.url, TargetKind::Asset, response.body, &mut report.counts).await;

    Ok(report)
}

/// Saves a same-origin 2xx asset response seen during a page visit
async fn capture_response(ctx: &VisitContext, response: InterceptedResponse, report: &mut VisitReport) {
    if !response.is_success() {
        tracing::trace!("Ignoring {} response for {}", response.status, response.url);
        return;
    }
    if response.body.is_empty() {
        tracing::trace!("Ignoring empty response for {}", response.url);
        return;
    }
    let url = match resolve_candidate(response.url.as_str(), &ctx.base_url, &ctx.api_path_prefixes) {
        Ok((url, TargetKind::Asset)) => url,
        Ok((_, TargetKind::Page)) => return,
        Err(e) => {
            tracing::trace!("Ignoring response for {}: {}", response.url, e);
            return;
        }
    };

    if is_next_data(url.path()) {
        report
            .discovered
            .extend(extract_urls_from_json_bytes(&response.body));
    }
    if save(ctx, &url, TargetKind::Asset, response.body, &mut report.counts)
        .await
        .is_some()
    {
        report.captured.push(url);
    }
}

/// Resolves the mirror path of a target and writes its bytes
///
/// Unsafe paths and write failures are logged and counted; they only drop
/// this one target.
async fn save(
    ctx: &VisitContext,
    url: &Url,
    kind: TargetKind,
    bytes: Vec<u8>,
    counts: &mut VisitCounts,
) -> Option<WriteOutcome> {
    let path = match ctx.resolver.resolve_url(url, kind) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("{}", e);
            counts.skipped += 1;
            return None;
        }
    };

    let writer = Arc::clone(&ctx.writer);
    let written = tokio::task::spawn_blocking(move || {
        let outcome = writer.write(&path, &bytes);
        (path, outcome)
    })
    .await;

    match written {
        Ok((path, Ok(outcome))) => {
            tracing::debug!("{} {} -> {} ({:?})", kind, url, path, outcome);
            counts.record_write(kind, outcome);
            Some(outcome)
        }
        Ok((_, Err(e))) => {
            tracing::warn!("{}", e);
            counts.failed += 1;
            None
        }
        Err(e) => {
            tracing::error!("Write task for {} failed: {}", url, e);
            counts.failed += 1;
            None
        }
    }
}

/// Returns true for Next.js page data responses
fn is_next_data(path: &str) -> bool {
    path.starts_with("/_next/data/") && path.ends_with(".json")
}

//! Crawler module for rendering and mirroring a site
//!
//! This module contains the crawl orchestration, including:
//! - The frontier and concurrency limit (`scheduler`)
//! - Page visits on pooled sessions and response routing (`coordinator`)

mod coordinator;
mod scheduler;

pub use crate::mirror::TargetKind;
pub use coordinator::Coordinator;
pub use scheduler::{CrawlTarget, ScheduledVisit, Scheduler};

use crate::config::Config;
use crate::output::CrawlStatistics;
use crate::runtime::HttpBrowser;
use crate::MirrorError;
use std::sync::Arc;

/// Runs a complete mirror operation with the HTTP runtime
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the browser runtime
/// 2. Seed the frontier from the base URL and entrypoints
/// 3. Log the session pool in
/// 4. Visit targets until the frontier is exhausted
///
/// # Arguments
///
/// * `config` - The mirror configuration
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Crawl completed
/// * `Err(MirrorError)` - Crawl could not start or lost every session
pub async fn crawl(config: Config) -> Result<CrawlStatistics, MirrorError> {
    let browser = HttpBrowser::new(config.crawler.user_agent.clone());
    let mut coordinator = Coordinator::new(config, Arc::new(browser))?;
    coordinator.run().await
}

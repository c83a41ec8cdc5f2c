//! Scheduler for the crawl frontier and page-visit concurrency
//!
//! This module handles:
//! - FIFO frontier of pages and assets to visit
//! - Deduplication of targets over the whole run
//! - Global concurrency limiting via a semaphore

use crate::mirror::TargetKind;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// A resolved URL waiting to be visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// Absolute, same-origin URL (canonical for pages)
    pub url: Url,

    pub kind: TargetKind,

    /// How often a visit of this target was bounced by session invalidation
    pub requeues: u32,
}

impl CrawlTarget {
    pub fn new(url: Url, kind: TargetKind) -> Self {
        Self {
            url,
            kind,
            requeues: 0,
        }
    }

    pub fn page(url: Url) -> Self {
        Self::new(url, TargetKind::Page)
    }

    pub fn asset(url: Url) -> Self {
        Self::new(url, TargetKind::Asset)
    }
}

/// A dequeued target together with its concurrency permit
///
/// The permit is released when the visit drops it.
pub struct ScheduledVisit {
    pub target: CrawlTarget,

    pub _permit: OwnedSemaphorePermit,
}

/// Scheduler manages the frontier queue and the concurrency limit
pub struct Scheduler {
    /// Semaphore limiting concurrent visits
    semaphore: Arc<Semaphore>,

    /// Current concurrency limit
    limit: usize,

    /// Targets waiting to be visited, in discovery order
    frontier: VecDeque<CrawlTarget>,

    /// Every URL ever accepted, queued or not
    seen: HashSet<String>,

    /// Stop accepting new targets after this many (0 = unlimited)
    max_targets: usize,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum number of concurrent visits
    /// * `max_targets` - Maximum number of targets accepted (0 = unlimited)
    pub fn new(concurrency: usize, max_targets: usize) -> Self {
        let limit = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            frontier: VecDeque::new(),
            seen: HashSet::new(),
            max_targets,
        }
    }

    /// Adds a target to the frontier unless it was seen before
    ///
    /// # Returns
    ///
    /// `true` if the target was queued, `false` if it is a duplicate or the
    /// target limit is reached
    pub fn enqueue(&mut self, target: CrawlTarget) -> bool {
        if self.max_targets > 0 && self.seen.len() >= self.max_targets {
            tracing::trace!("Target limit reached, dropping {}", target.url);
            return false;
        }
        if !self.seen.insert(target.url.as_str().to_string()) {
            return false;
        }
        tracing::trace!("Enqueued {} {}", target.kind, target.url);
        self.frontier.push_back(target);
        true
    }

    /// Puts a target back at the end of the frontier, bypassing deduplication
    pub fn requeue(&mut self, mut target: CrawlTarget) {
        target.requeues += 1;
        self.seen.insert(target.url.as_str().to_string());
        self.frontier.push_back(target);
    }

    /// Records a URL as handled without queueing it
    ///
    /// Used for assets that were captured from a page's network traffic, so
    /// they are not fetched a second time.
    pub fn mark_seen(&mut self, url: &Url) -> bool {
        self.seen.insert(url.as_str().to_string())
    }

    /// Pops the next target, if any
    pub fn dequeue(&mut self) -> Option<CrawlTarget> {
        self.frontier.pop_front()
    }

    /// Waits for a concurrency permit and pops the next target
    ///
    /// # Returns
    ///
    /// * `Some(ScheduledVisit)` - A target that may be visited now
    /// * `None` - The frontier is empty
    pub async fn next_visit(&mut self) -> Option<ScheduledVisit> {
        if self.frontier.is_empty() {
            return None;
        }

        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let target = self.dequeue()?;
        tracing::debug!("Scheduling {} {}", target.kind, target.url);

        Some(ScheduledVisit {
            target,
            _permit: permit,
        })
    }

    /// Changes the number of concurrent visits
    ///
    /// Raising the limit takes effect immediately. Lowering it takes effect
    /// as running visits finish and hand back their permits.
    pub fn set_concurrency_limit(&mut self, limit: usize) {
        let limit = limit.max(1);
        if limit > self.limit {
            self.semaphore.add_permits(limit - self.limit);
        } else if limit < self.limit {
            let excess = (self.limit - limit) as u32;
            let semaphore = self.semaphore.clone();
            tokio::spawn(async move {
                if let Ok(permits) = semaphore.acquire_many_owned(excess).await {
                    permits.forget();
                }
            });
        }
        tracing::debug!("Concurrency limit {} -> {}", self.limit, limit);
        self.limit = limit;
    }

    pub fn concurrency_limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of targets in the frontier
    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    /// Returns whether the frontier is empty
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Number of distinct URLs accepted so far
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

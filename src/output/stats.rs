//! Crawl statistics
//!
//! Counters are collected by the coordinator while the crawl runs and
//! printed once it ends.

use crate::mirror::{TargetKind, WriteOutcome};
use chrono::{DateTime, Utc};
use std::ops::AddAssign;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Targets accepted into the frontier
    pub targets_enqueued: u64,

    pub pages_written: u64,
    pub pages_unchanged: u64,
    pub assets_written: u64,
    pub assets_unchanged: u64,

    /// Targets dropped on purpose (unsafe paths, non-2xx responses)
    pub skipped: u64,

    /// Navigation, fetch and write failures
    pub failed: u64,

    /// Visits bounced to the login route
    pub invalidations: u64,
}

/// Per-visit counters merged into [`CrawlStatistics`] by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitCounts {
    pub pages_written: u64,
    pub pages_unchanged: u64,
    pub assets_written: u64,
    pub assets_unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub invalidations: u64,
}

impl VisitCounts {
    /// Counts one successful write
    pub fn record_write(&mut self, kind: TargetKind, outcome: WriteOutcome) {
        match (kind, outcome) {
            (TargetKind::Page, WriteOutcome::Written) => self.pages_written += 1,
            (TargetKind::Page, WriteOutcome::Unchanged) => self.pages_unchanged += 1,
            (TargetKind::Asset, WriteOutcome::Written) => self.assets_written += 1,
            (TargetKind::Asset, WriteOutcome::Unchanged) => self.assets_unchanged += 1,
        }
    }
}

impl AddAssign<VisitCounts> for CrawlStatistics {
    fn add_assign(&mut self, counts: VisitCounts) {
        self.pages_written += counts.pages_written;
        self.pages_unchanged += counts.pages_unchanged;
        self.assets_written += counts.assets_written;
        self.assets_unchanged += counts.assets_unchanged;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
        self.invalidations += counts.invalidations;
    }
}

impl Default for CrawlStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStatistics {
    /// Starts a statistics record at the current time
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            targets_enqueued: 0,
            pages_written: 0,
            pages_unchanged: 0,
            assets_written: 0,
            assets_unchanged: 0,
            skipped: 0,
            failed: 0,
            invalidations: 0,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Pages present in the mirror after the run
    pub fn pages_saved(&self) -> u64 {
        self.pages_written + self.pages_unchanged
    }

    /// Assets present in the mirror after the run
    pub fn assets_saved(&self) -> u64 {
        self.assets_written + self.assets_unchanged
    }

    /// Whole seconds between start and finish, if finished
    pub fn duration_seconds(&self) -> Option<u64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds().max(0) as u64)
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Mirror Statistics ===\n");

    println!("Run:");
    println!("  Started: {}", stats.started_at.to_rfc3339());
    if let Some(finished) = stats.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    if let Some(seconds) = stats.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!("  Targets enqueued: {}", stats.targets_enqueued);
    println!();

    println!("Pages:");
    println!("  Written: {}", stats.pages_written);
    println!("  Unchanged: {}", stats.pages_unchanged);
    println!();

    println!("Assets:");
    println!("  Written: {}", stats.assets_written);
    println!("  Unchanged: {}", stats.assets_unchanged);
    println!();

    if stats.skipped > 0 || stats.failed > 0 || stats.invalidations > 0 {
        println!("Problems:");
        println!("  Skipped: {}", stats.skipped);
        println!("  Failed: {}", stats.failed);
        println!("  Session invalidations: {}", stats.invalidations);
        println!();
    }

    let attempted = stats.pages_saved() + stats.skipped + stats.failed;
    let success_rate = if attempted > 0 {
        (stats.pages_saved() as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    println!("Page success rate: {:.1}%", success_rate);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_counts_merge() {
        let mut counts = VisitCounts::default();
        counts.record_write(TargetKind::Page, WriteOutcome::Written);
        counts.record_write(TargetKind::Asset, WriteOutcome::Written);
        counts.record_write(TargetKind::Asset, WriteOutcome::Unchanged);
        counts.failed += 1;

        let mut stats = CrawlStatistics::new();
        stats += counts;
        stats += counts;

        assert_eq!(stats.pages_written, 2);
        assert_eq!(stats.assets_saved(), 4);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pages_saved(), 2);
    }

    #[test]
    fn test_duration_only_after_finish() {
        let mut stats = CrawlStatistics::new();
        assert_eq!(stats.duration_seconds(), None);
        stats.finish();
        assert!(stats.duration_seconds().is_some());
    }
}

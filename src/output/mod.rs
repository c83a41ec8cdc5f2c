//! Output module for crawl reporting
//!
//! The mirror tree itself is written by [`crate::mirror`]; this module only
//! tracks and prints what a run did.

pub mod stats;

pub use stats::{print_statistics, CrawlStatistics, VisitCounts};

//! Mirror module for spa-mirror
//!
//! This module maps crawl targets onto the on-disk mirror tree and persists
//! their content:
//! - `resolver` turns a URL and its kind into a relative, filesystem-safe path
//! - `writer` writes content atomically and skips identical files
//!
//! The output layout is:
//!
//! ```text
//! pages/<segments>/index.html
//! pages_q/<segments>/<query>/index.html
//! assets/<segments>
//! assets_q/<segments>/<query>
//! ```

mod resolver;
mod writer;

pub use resolver::{encode_query, MirrorPath, PathResolver, MAX_SEGMENT_LEN};
pub use writer::{MirrorWriter, WriteOutcome};

use std::fmt;

/// What a crawl target is mirrored as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A rendered HTML document, saved as `index.html` in its own directory
    Page,

    /// Raw response bytes saved under the URL's own file name
    Asset,
}

impl TargetKind {
    /// Directory holding targets of this kind without a query string
    pub fn tree(&self) -> &'static str {
        match self {
            TargetKind::Page => "pages",
            TargetKind::Asset => "assets",
        }
    }

    /// Directory holding query-string variants of this kind
    pub fn query_tree(&self) -> &'static str {
        match self {
            TargetKind::Page => "pages_q",
            TargetKind::Asset => "assets_q",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Page => write!(f, "page"),
            TargetKind::Asset => write!(f, "asset"),
        }
    }
}

//! URL discovery for spa-mirror
//!
//! This module finds candidate URLs in a rendered page:
//! - `extractor` reads link-bearing attributes from the live document
//! - `hydration` walks framework hydration state and JSON payloads
//! - `text` scans raw HTML and script text for URL-shaped strings
//!
//! Every source yields raw candidate strings. Resolution against the page URL
//! and scoping to the mirrored origin happen in the crawler.

mod extractor;
mod hydration;
mod text;

pub use extractor::{candidate, extract_links, ExtractLinks, ExtractionSkip};
pub use hydration::{collect_json_candidates, extract_urls_from_json_bytes, MAX_JSON_DEPTH};
pub use text::extract_urls_from_text;

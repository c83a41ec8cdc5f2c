use crate::discovery::hydration::collect_json_candidates;
use crate::dom::{Document, DomError, NodeId};
use crate::runtime::PageScript;
use crate::url::has_candidate_prefix;
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a single attribute value was not retained
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionSkip {
    #[error("empty value")]
    Empty,

    #[error("not an absolute, protocol-relative or root-relative URL: {0}")]
    NoCandidatePrefix(String),

    #[error("selector failed: {0}")]
    Selector(String),
}

/// Elements whose `href` is a navigation or prefetch target
const LINK_SELECTORS: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[rel~=preload][href]", "href"),
    ("link[rel~=prefetch][href]", "href"),
];

/// Elements whose `src`/`href` is a subresource
const RESOURCE_SELECTORS: &[(&str, &str)] = &[
    ("script[src]", "src"),
    ("link[rel~=stylesheet][href]", "href"),
    ("img[src]", "src"),
    ("source[src]", "src"),
    ("video[src]", "src"),
    ("audio[src]", "src"),
];

const SRCSET_SELECTORS: &[&str] = &["img[srcset]", "source[srcset]"];

/// Checks one raw value against the candidate prefix rule
///
/// # Returns
///
/// * `Ok(String)` - The trimmed candidate
/// * `Err(ExtractionSkip)` - The value is not a candidate
pub fn candidate(raw: &str) -> Result<String, ExtractionSkip> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionSkip::Empty);
    }
    if !has_candidate_prefix(trimmed) {
        return Err(ExtractionSkip::NoCandidatePrefix(trimmed.chars().take(80).collect()));
    }
    Ok(trimmed.to_string())
}

/// Extracts candidate URLs from a rendered document
///
/// Sources, merged into one set:
/// 1. `href` of anchors and of preload/prefetch links
/// 2. String values of the hydration state (`__NEXT_DATA__`, `__NUXT_DATA__`)
/// 3. `src`/`href` of scripts, stylesheets, images and media
/// 4. The URL part of every `srcset` entry
///
/// The result is sorted and free of duplicates. A value that fails the
/// candidate test is skipped without affecting the others.
///
/// # Example
///
/// ```
/// use spa_mirror::discovery::extract_links;
/// use spa_mirror::dom::HtmlDocument;
///
/// let doc = HtmlDocument::parse(
///     "<a href='/b'>b</a><a href='foo/bar'>x</a><img srcset='/s.png 1x, /l.png 2x'>",
/// );
/// assert_eq!(extract_links(&doc), vec!["/b", "/l.png", "/s.png"]);
/// ```
pub fn extract_links(doc: &dyn Document) -> Vec<String> {
    let mut found = BTreeSet::new();

    // 1. Navigation targets
    for (selector, attr) in LINK_SELECTORS {
        collect_attribute(doc, selector, attr, &mut found);
    }

    // 2. Hydration state
    if let Some(state) = doc.hydration_state() {
        collect_json_candidates(&state, &mut found);
    }

    // 3. Subresources
    for (selector, attr) in RESOURCE_SELECTORS {
        collect_attribute(doc, selector, attr, &mut found);
    }

    // 4. srcset entries
    for selector in SRCSET_SELECTORS {
        for node in select(doc, selector) {
            let Some(srcset) = doc.attribute(node, "srcset") else {
                continue;
            };
            for entry in srcset.split(',') {
                let url = entry.split_whitespace().next().unwrap_or_default();
                record(url, &mut found);
            }
        }
    }

    found.into_iter().collect()
}

fn select(doc: &dyn Document, selector: &str) -> Vec<NodeId> {
    match doc.query_selector_all(selector) {
        Ok(nodes) => nodes,
        Err(e) => {
            tracing::trace!("{}", ExtractionSkip::Selector(e.to_string()));
            Vec::new()
        }
    }
}

fn collect_attribute(doc: &dyn Document, selector: &str, attr: &str, found: &mut BTreeSet<String>) {
    for node in select(doc, selector) {
        if let Some(value) = doc.attribute(node, attr) {
            record(&value, found);
        }
    }
}

fn record(raw: &str, found: &mut BTreeSet<String>) {
    match candidate(raw) {
        Ok(url) => {
            found.insert(url);
        }
        Err(skip) => tracing::trace!("Skipping {:?}: {}", raw, skip),
    }
}

/// In-page script returning [`extract_links`] as a JSON array
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractLinks;

impl PageScript for ExtractLinks {
    fn name(&self) -> &str {
        "extract-links"
    }

    fn run(&self, doc: &dyn Document) -> Result<serde_json::Value, DomError> {
        Ok(serde_json::Value::from(extract_links(doc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::HtmlDocument;

    #[test]
    fn test_candidate_prefix_rule() {
        assert_eq!(candidate("  /a "), Ok("/a".to_string()));
        assert_eq!(candidate("//cdn.example.com/x"), Ok("//cdn.example.com/x".to_string()));
        assert_eq!(candidate("https://e.com"), Ok("https://e.com".to_string()));
        assert_eq!(candidate("   "), Err(ExtractionSkip::Empty));
        assert!(matches!(
            candidate("foo/bar"),
            Err(ExtractionSkip::NoCandidatePrefix(_))
        ));
        assert!(candidate("mailto:a@b.com").is_err());
        assert!(candidate("#top").is_err());
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let doc = HtmlDocument::parse(
            "<a href='/z'>z</a><a href='/a'>a</a><a href='/z'>again</a>\
             <link rel='preload' href='/p.js'><link rel='prefetch' href='/q'>",
        );
        assert_eq!(extract_links(&doc), vec!["/a", "/p.js", "/q", "/z"]);
    }

    #[test]
    fn test_relative_paths_discarded() {
        let doc = HtmlDocument::parse("<a href='foo/bar'>x</a><a href=''>y</a><a href='/ok'>z</a>");
        assert_eq!(extract_links(&doc), vec!["/ok"]);
    }

    #[test]
    fn test_subresources() {
        let doc = HtmlDocument::parse(
            "<head><script src='/_next/static/app.js'></script>\
             <link rel='stylesheet' href='/s.css'><link rel='icon' href='/favicon.ico'></head>\
             <body><img src='https://example.com/i.png'><video src='/v.mp4'>\
             <source src='//example.com/v.webm'></video><audio src='/a.mp3'></audio></body>",
        );
        assert_eq!(
            extract_links(&doc),
            vec![
                "//example.com/v.webm",
                "/_next/static/app.js",
                "/a.mp3",
                "/s.css",
                "/v.mp4",
                "https://example.com/i.png",
            ]
        );
    }

    #[test]
    fn test_srcset_splitting() {
        let doc = HtmlDocument::parse(
            "<picture><source srcset='/a-1x.webp 1x, /a-2x.webp 2x'>\
             <img srcset=' /b-480.png 480w,/b-800.png 800w , ' src='/b.png'></picture>",
        );
        assert_eq!(
            extract_links(&doc),
            vec!["/a-1x.webp", "/a-2x.webp", "/b-480.png", "/b-800.png", "/b.png"]
        );
    }

    #[test]
    fn test_hydration_state() {
        let doc = HtmlDocument::parse(
            r#"<a href="/b">b</a>
            <script id="__NEXT_DATA__" type="application/json">
              {"props":{"pageProps":{"next":"/c","items":[{"href":"/d"},"text", 3, null]}},"page":"/a"}
            </script>"#,
        );
        assert_eq!(extract_links(&doc), vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn test_deterministic() {
        let html = "<a href='/x'>x</a><img src='/y.png'><a href='/w'>w</a>";
        let first = extract_links(&HtmlDocument::parse(html));
        let second = extract_links(&HtmlDocument::parse(html));
        assert_eq!(first, second);
    }

    #[test]
    fn test_page_script() {
        let doc = HtmlDocument::parse("<a href='/one'>1</a>");
        let value = ExtractLinks.run(&doc).unwrap();
        assert_eq!(value, serde_json::json!(["/one"]));
    }
}

use crate::url::unescape_slashes;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

struct TextPatterns {
    absolute: Regex,
    protocol_relative: Regex,
    quoted_path: Regex,
}

fn patterns() -> &'static TextPatterns {
    static PATTERNS: OnceLock<TextPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TextPatterns {
        absolute: Regex::new(r#"https?://[^\s"'<>]+"#).expect("static regex"),
        protocol_relative: Regex::new(r#"//[^\s"'<>]+"#).expect("static regex"),
        quoted_path: Regex::new(r#"["'](/[^"']+)["']"#).expect("static regex"),
    })
}

/// Scans raw text (HTML source, inline scripts) for URL-shaped strings
///
/// Finds absolute URLs, protocol-relative URLs and quoted root-relative
/// paths after undoing `\/` escaping. Matches are raw candidates; many will
/// not survive resolution, which is expected for a text heuristic.
///
/// # Example
///
/// ```
/// use spa_mirror::discovery::extract_urls_from_text;
///
/// let found = extract_urls_from_text(r#"router.push("/settings"); fetch('https:\/\/example.com\/x')"#);
/// assert!(found.contains(&"/settings".to_string()));
/// assert!(found.contains(&"https://example.com/x".to_string()));
/// ```
pub fn extract_urls_from_text(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let text = unescape_slashes(text);
    let patterns = patterns();
    let mut found = BTreeSet::new();

    for m in patterns.absolute.find_iter(&text) {
        found.insert(m.as_str().to_string());
    }
    for m in patterns.protocol_relative.find_iter(&text) {
        found.insert(m.as_str().to_string());
    }
    for caps in patterns.quoted_path.captures_iter(&text) {
        if let Some(path) = caps.get(1) {
            found.insert(path.as_str().to_string());
        }
    }

    found.into_iter().collect()
}

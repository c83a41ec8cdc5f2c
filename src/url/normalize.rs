use crate::mirror::TargetKind;
use crate::url::{canonicalize_page_url, has_candidate_prefix, looks_like_api_path, looks_like_asset};
use crate::UrlError;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Longest candidate accepted for enqueueing
pub const MAX_URL_LEN: usize = 2048;

fn unicode_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("static regex"))
}

/// Undoes JSON-style slash escaping (`\/` and `\\`) and drops trailing backslashes
pub fn unescape_slashes(s: &str) -> String {
    s.trim_end_matches('\\')
        .replace("\\/", "/")
        .replace("\\\\", "\\")
}

/// Replaces `\uXXXX` escapes with the characters they encode
pub fn unescape_unicode(s: &str) -> String {
    unicode_escape_regex()
        .replace_all(s, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Resolves a raw candidate string into a crawl URL and its kind
///
/// # Normalization Steps
///
/// 1. Trim whitespace and surrounding quotes/backticks
/// 2. Require a candidate prefix (`/`, `//`, `http://`, `https://`)
/// 3. Unescape `\/` and `\uXXXX` sequences left over from JSON or scripts
/// 4. Reject anything longer than [`MAX_URL_LEN`]
/// 5. Join against `base`; keep only same-origin http(s)
/// 6. Drop API endpoints (`api_path_prefixes`)
/// 7. Classify as asset (`/_next/…` or a known static extension) or page;
///    pages are canonicalized (no fragment, no trailing slash)
///
/// # Examples
///
/// ```
/// use spa_mirror::url::resolve_candidate;
/// use spa_mirror::TargetKind;
/// use url::Url;
///
/// let base = Url::parse("https://example.com").unwrap();
/// let (url, kind) = resolve_candidate(" /docs/ ", &base, &["/api".to_string()]).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs");
/// assert_eq!(kind, TargetKind::Page);
/// ```
pub fn resolve_candidate(
    raw: &str,
    base: &Url,
    api_path_prefixes: &[String],
) -> Result<(Url, TargetKind), UrlError> {
    // Step 1
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '`'));

    // Step 2
    if !has_candidate_prefix(trimmed) {
        return Err(UrlError::NotCandidate(truncate(trimmed)));
    }

    // Step 3
    let unescaped = unescape_unicode(&unescape_slashes(trimmed));

    // Step 4
    if unescaped.len() > MAX_URL_LEN {
        return Err(UrlError::TooLong { max: MAX_URL_LEN });
    }

    // Step 5
    let mut url = base
        .join(&unescaped)
        .map_err(|e| UrlError::Parse(format!("{}: {}", truncate(&unescaped), e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }
    if url.origin() != base.origin() {
        return Err(UrlError::CrossOrigin(url.to_string()));
    }

    // Step 6
    if looks_like_api_path(url.path(), api_path_prefixes) {
        return Err(UrlError::ApiPath(url.path().to_string()));
    }

    // Step 7
    url.set_fragment(None);
    if looks_like_asset(url.path()) {
        Ok((url, TargetKind::Asset))
    } else {
        Ok((canonicalize_page_url(&url), TargetKind::Page))
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    fn api() -> Vec<String> {
        vec!["/api".to_string()]
    }

    fn page(raw: &str) -> Option<String> {
        match resolve_candidate(raw, &base(), &api()) {
            Ok((url, TargetKind::Page)) => Some(url.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_canonicalizes_pages() {
        assert_eq!(page(" /docs/ "), Some("https://example.com/docs".to_string()));
        assert_eq!(
            page("https://example.com/docs/#x"),
            Some("https://example.com/docs".to_string())
        );
        assert_eq!(page("'/quoted'"), Some("https://example.com/quoted".to_string()));
    }

    #[test]
    fn test_keeps_query_on_pages() {
        assert_eq!(
            page("/search?page=2"),
            Some("https://example.com/search?page=2".to_string())
        );
    }

    #[test]
    fn test_unescapes_json_strings() {
        assert_eq!(
            page("\\/docs\\/intro"),
            None,
            "leading backslash is not a candidate prefix"
        );
        assert_eq!(
            page("/docs\\/intro\\/"),
            Some("https://example.com/docs/intro".to_string())
        );
        assert_eq!(
            page("/caf\\u00e9"),
            Some("https://example.com/caf%C3%A9".to_string())
        );
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let too_long = format!("/{}", "x".repeat(MAX_URL_LEN + 1));
        for raw in [
            "",
            "   ",
            "#section",
            "mailto:a@b.com",
            "javascript:void(0)",
            "ftp://example.com/a",
            "relative/path",
            "http://[",
            too_long.as_str(),
            "https://other.example.com/x",
            "https://example.com/api",
            "https://example.com/api/v1/users",
        ] {
            assert!(
                resolve_candidate(raw, &base(), &api()).is_err(),
                "expected {:?} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_protocol_relative_same_origin() {
        assert_eq!(
            page("//example.com/about"),
            Some("https://example.com/about".to_string())
        );
        assert!(resolve_candidate("//cdn.example.net/x", &base(), &api()).is_err());
    }

    #[test]
    fn test_classifies_assets() {
        let (url, kind) =
            resolve_candidate("/_next/static/chunks/app.js?v=1", &base(), &api()).unwrap();
        assert_eq!(kind, TargetKind::Asset);
        assert_eq!(url.as_str(), "https://example.com/_next/static/chunks/app.js?v=1");

        let (_, kind) = resolve_candidate("/static/logo.png", &base(), &api()).unwrap();
        assert_eq!(kind, TargetKind::Asset);
    }
}

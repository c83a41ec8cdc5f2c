//! URL handling module for spa-mirror
//!
//! This module provides the candidate prefix test shared by every discovery
//! source, candidate normalization for the crawl queue, page/asset
//! classification, and include/exclude matching.

mod matcher;
mod normalize;

pub use matcher::{LinkPattern, UrlFilter};
pub use normalize::{resolve_candidate, unescape_slashes, unescape_unicode, MAX_URL_LEN};

use url::Url;

/// File extensions treated as static assets rather than pages
const ASSET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "map", "css", "json", "xml", "txt", "webmanifest", "png", "jpg", "jpeg",
    "gif", "svg", "ico", "webp", "avif", "bmp", "tif", "tiff", "woff", "woff2", "ttf", "otf",
    "eot", "mp4", "webm", "ogg", "mp3", "wav", "m4a", "flac", "pdf", "zip", "gz", "wasm", "csv",
];

/// Returns true if the string is a candidate URL
///
/// Candidates are absolute (`http://`, `https://`), protocol-relative (`//`)
/// or root-relative (`/`). Everything else, including relative paths without
/// a leading slash, is ambiguous and discarded.
///
/// # Examples
///
/// ```
/// use spa_mirror::url::has_candidate_prefix;
///
/// assert!(has_candidate_prefix("/foo/bar"));
/// assert!(has_candidate_prefix("//cdn.example.com/x.js"));
/// assert!(has_candidate_prefix("https://example.com"));
/// assert!(!has_candidate_prefix("foo/bar"));
/// assert!(!has_candidate_prefix("mailto:a@b.com"));
/// ```
pub fn has_candidate_prefix(s: &str) -> bool {
    s.starts_with('/') || s.starts_with("http://") || s.starts_with("https://")
}

/// Returns true if `path` is one of the API prefixes or lies below one
///
/// `/api` matches `/api` and `/api/v1` but not `/api-v1`.
pub fn looks_like_api_path(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Returns true if the last path segment has a known static file extension
pub fn has_known_extension(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Returns true for framework build output or files with a static extension
pub fn looks_like_asset(path: &str) -> bool {
    path.contains("/_next/") || has_known_extension(path)
}

/// Canonical form of a page URL: no fragment, no empty query, no trailing
/// slash (except `/`)
pub fn canonicalize_page_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    if url.query() == Some("") {
        url.set_query(None);
    }
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url
}

/// Returns true if the URL points at the login route or below it
pub fn is_login_url(url: &Url, login_path: &str) -> bool {
    let login = login_path.trim_end_matches('/');
    if login.is_empty() {
        return false;
    }
    let path = url.path();
    path == login
        || path
            .strip_prefix(login)
            .is_some_and(|rest| rest.starts_with('/'))
}

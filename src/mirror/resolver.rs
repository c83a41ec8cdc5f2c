use crate::mirror::TargetKind;
use crate::MirrorError;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Longest single path component accepted on disk (bytes)
pub const MAX_SEGMENT_LEN: usize = 255;

/// A mirror location, relative to the output root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirrorPath(PathBuf);

impl MirrorPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for MirrorPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for MirrorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Maps crawl targets onto the mirror tree
///
/// Resolution is pure: it never touches the filesystem, and the same input
/// always produces the same output. Distinct (path, query) pairs never share
/// a location, which is what lets concurrent page visits write without
/// coordinating.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl PathResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves a raw URL string to its mirror path
    ///
    /// The string is inspected as given, before any URL normalization, so
    /// traversal attempts such as `/../../etc/passwd` are caught rather than
    /// silently collapsed.
    ///
    /// # Arguments
    ///
    /// * `target` - Absolute, protocol-relative or root-relative URL
    /// * `kind` - Whether the target is saved as a page or an asset
    ///
    /// # Returns
    ///
    /// * `Ok(MirrorPath)` - The relative location inside the output root
    /// * `Err(MirrorError::UnsafePath)` - The path cannot be mirrored safely
    ///
    /// # Example
    ///
    /// ```
    /// use spa_mirror::mirror::{PathResolver, TargetKind};
    /// use std::path::Path;
    ///
    /// let resolver = PathResolver::new();
    /// let path = resolver.resolve("https://example.com/docs/intro", TargetKind::Page).unwrap();
    /// assert_eq!(path.as_path(), Path::new("pages/docs/intro/index.html"));
    ///
    /// assert!(resolver.resolve("/../../etc/passwd", TargetKind::Page).is_err());
    /// ```
    pub fn resolve(&self, target: &str, kind: TargetKind) -> Result<MirrorPath, MirrorError> {
        // 1. Drop the fragment and split off the raw query
        let without_fragment = target.split('#').next().unwrap_or_default();
        let (before_query, query) = match without_fragment.split_once('?') {
            Some((before, query)) => (before, query),
            None => (without_fragment, ""),
        };

        // 2. Strip scheme and authority
        let path = strip_origin(before_query);
        let path = if path.is_empty() { "/" } else { path };
        if !path.starts_with('/') {
            return Err(MirrorError::unsafe_path(target, "path is not absolute"));
        }

        // 3. Split and check segments
        let mut segments: Vec<&str> = path[1..].split('/').collect();
        if segments.last() == Some(&"") {
            segments.pop();
            if kind == TargetKind::Asset {
                return Err(MirrorError::unsafe_path(target, "asset has no file name"));
            }
        }
        if kind == TargetKind::Asset && segments.is_empty() {
            return Err(MirrorError::unsafe_path(target, "asset has no file name"));
        }
        for segment in &segments {
            check_segment(target, segment)?;
        }

        // 4. Build the location
        let mut relative = PathBuf::new();
        if query.is_empty() {
            relative.push(kind.tree());
            relative.extend(&segments);
            if kind == TargetKind::Page {
                relative.push("index.html");
            }
        } else {
            let encoded = encode_query(query);
            if encoded.len() > MAX_SEGMENT_LEN {
                return Err(MirrorError::unsafe_path(
                    target,
                    format!("encoded query exceeds {} bytes", MAX_SEGMENT_LEN),
                ));
            }
            relative.push(kind.query_tree());
            relative.extend(&segments);
            relative.push(encoded);
            if kind == TargetKind::Page {
                relative.push("index.html");
            }
        }

        Ok(MirrorPath(relative))
    }

    /// Resolves a parsed URL to its mirror path
    pub fn resolve_url(&self, url: &Url, kind: TargetKind) -> Result<MirrorPath, MirrorError> {
        self.resolve(url.as_str(), kind)
    }
}

/// Encodes a raw query string as a single safe path component
///
/// The encoding is injective: `%` is always escaped, so every `%` in the
/// output starts an escape produced here.
///
/// # Example
///
/// ```
/// use spa_mirror::mirror::encode_query;
///
/// assert_eq!(encode_query("a=1&b=2"), "a=1&b=2");
/// assert_eq!(encode_query("path=/x"), "path=%2Fx");
/// assert_eq!(encode_query("q=100%"), "q=100%25");
/// assert_eq!(encode_query(".."), "%2E%2E");
/// ```
pub fn encode_query(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            '/' => encoded.push_str("%2F"),
            '\\' => encoded.push_str("%5C"),
            c if c.is_ascii_control() => encoded.push_str(&format!("%{:02X}", c as u8)),
            c => encoded.push(c),
        }
    }

    if !encoded.is_empty() && encoded.chars().all(|c| c == '.') {
        return "%2E".repeat(encoded.len());
    }
    encoded
}

/// Removes `scheme://authority` or `//authority` from the front of a URL
fn strip_origin(s: &str) -> &str {
    let rest = if let Some(rest) = s.strip_prefix("//") {
        rest
    } else if let Some((scheme, rest)) = s.split_once("://") {
        if !is_scheme(scheme) {
            return s;
        }
        rest
    } else {
        return s;
    };

    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "",
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn check_segment(target: &str, segment: &str) -> Result<(), MirrorError> {
    if segment.is_empty() {
        return Err(MirrorError::unsafe_path(target, "empty path segment"));
    }

    let decoded_dots = segment.to_ascii_lowercase().replace("%2e", ".");
    if decoded_dots == "." || decoded_dots == ".." {
        return Err(MirrorError::unsafe_path(
            target,
            format!("dot segment '{}'", segment),
        ));
    }

    if segment.contains('\0') || segment.contains('\\') {
        return Err(MirrorError::unsafe_path(
            target,
            "NUL or backslash in path segment",
        ));
    }

    if segment.len() > MAX_SEGMENT_LEN {
        return Err(MirrorError::unsafe_path(
            target,
            format!("path segment exceeds {} bytes", MAX_SEGMENT_LEN),
        ));
    }

    Ok(())
}

use crate::ConfigError;
use regex::Regex;
use url::Url;

/// A compiled include/exclude pattern for crawl URLs
///
/// Globs use `*` for "anything except `/`", `**` for "anything" and `?` for a
/// single non-`/` character; every other character matches literally. Both
/// forms are matched against the full absolute URL.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    source: String,
    regex: Regex,
}

impl LinkPattern {
    /// Compiles a glob pattern
    pub fn glob(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| ConfigError::InvalidPattern(format!("glob '{}': {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Compiles a regular expression (unanchored, like `re.search`)
    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("regex '{}': {}", pattern, e)))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written in the configuration
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Translates a glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Include/exclude filter applied to page URLs before they are enqueued
///
/// A URL passes when it matches at least one include pattern and no exclude
/// pattern.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    include: Vec<LinkPattern>,
    exclude: Vec<LinkPattern>,
}

impl UrlFilter {
    pub fn new(include: Vec<LinkPattern>, exclude: Vec<LinkPattern>) -> Self {
        Self { include, exclude }
    }

    /// Builds the filter from configuration lists
    ///
    /// With no include patterns configured, everything under `base` is
    /// included (`<base>/**`).
    pub fn from_config(
        base: &Url,
        include_globs: &[String],
        include_regexes: &[String],
        exclude_globs: &[String],
        exclude_regexes: &[String],
    ) -> Result<Self, ConfigError> {
        let mut include = Vec::new();
        for glob in include_globs {
            include.push(LinkPattern::glob(glob)?);
        }
        for regex in include_regexes {
            include.push(LinkPattern::regex(regex)?);
        }
        if include.is_empty() {
            let root = base.as_str().trim_end_matches('/');
            include.push(LinkPattern::glob(root)?);
            include.push(LinkPattern::glob(&format!("{}/**", root))?);
        }

        let mut exclude = Vec::new();
        for glob in exclude_globs {
            exclude.push(LinkPattern::glob(glob)?);
        }
        for regex in exclude_regexes {
            exclude.push(LinkPattern::regex(regex)?);
        }

        Ok(Self::new(include, exclude))
    }

    /// Adds an exclude pattern
    pub fn exclude(&mut self, pattern: LinkPattern) {
        self.exclude.push(pattern);
    }

    pub fn allows(&self, url: &str) -> bool {
        self.include.iter().any(|p| p.is_match(url)) && !self.exclude.iter().any(|p| p.is_match(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_single_star_stops_at_slash() {
        let p = LinkPattern::glob("https://example.com/docs/*").unwrap();
        assert!(p.is_match("https://example.com/docs/intro"));
        assert!(!p.is_match("https://example.com/docs/intro/deeper"));
    }

    #[test]
    fn test_glob_double_star() {
        let p = LinkPattern::glob("https://example.com/**").unwrap();
        assert!(p.is_match("https://example.com/a/b/c?x=1"));
        assert!(!p.is_match("https://example.org/a"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let p = LinkPattern::glob("https://example.com/a.b?").unwrap();
        assert!(p.is_match("https://example.com/a.bc"));
        assert!(!p.is_match("https://example.com/aXbc"));
    }

    #[test]
    fn test_regex_is_unanchored() {
        let p = LinkPattern::regex(r"/logout").unwrap();
        assert!(p.is_match("https://example.com/account/logout?x"));
    }

    #[test]
    fn test_invalid_regex() {
        assert!(LinkPattern::regex("(").is_err());
    }

    #[test]
    fn test_default_filter_scopes_to_base() {
        let base = Url::parse("https://example.com/app").unwrap();
        let filter = UrlFilter::from_config(&base, &[], &[], &[], &[]).unwrap();
        assert!(filter.allows("https://example.com/app"));
        assert!(filter.allows("https://example.com/app/settings"));
        assert!(!filter.allows("https://example.com/other"));
    }

    #[test]
    fn test_exclude_wins() {
        let base = Url::parse("https://example.com").unwrap();
        let filter = UrlFilter::from_config(
            &base,
            &[],
            &[],
            &["https://example.com/admin/**".to_string()],
            &[r"\.pdf$".to_string()],
        )
        .unwrap();
        assert!(filter.allows("https://example.com/docs"));
        assert!(!filter.allows("https://example.com/admin/users"));
        assert!(!filter.allows("https://example.com/report.pdf"));
    }
}

//! Selector lists with a trailing `:visible` filter
//!
//! Matching is done by `scraper`. Each comma-separated alternative may end in
//! `:visible`, which is stripped before parsing and applied to the matches.

use crate::dom::DomError;
use scraper::{ElementRef, Selector};

pub(crate) struct SelectorList {
    alternatives: Vec<(Selector, bool)>,
}

impl SelectorList {
    pub(crate) fn parse(input: &str) -> Result<Self, DomError> {
        let mut alternatives = Vec::new();
        for part in split_top_level(input) {
            let part = part.trim();
            let (css, visible) = match part.strip_suffix(":visible") {
                Some(rest) => (rest.trim_end(), true),
                None => (part, false),
            };
            let css = if css.is_empty() { "*" } else { css };
            let selector = Selector::parse(css)
                .map_err(|e| DomError::Selector(format!("'{}': {}", input, e)))?;
            alternatives.push((selector, visible));
        }
        if alternatives.is_empty() {
            return Err(DomError::Selector(format!("'{}': empty selector", input)));
        }
        Ok(Self { alternatives })
    }

    /// Tests `element`; `is_visible` is only consulted for `:visible` alternatives
    pub(crate) fn matches(&self, element: &ElementRef, is_visible: impl Fn(&ElementRef) -> bool) -> bool {
        self.alternatives
            .iter()
            .any(|(selector, visible)| selector.matches(element) && (!visible || is_visible(element)))
    }
}

/// Splits on commas outside brackets, parentheses and quotes
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a[href], img[alt='a,b'], :is(p, li)"),
            vec!["a[href]", " img[alt='a,b']", " :is(p, li)"]
        );
        assert!(split_top_level(" , ").is_empty());
    }

    #[test]
    fn test_visible_is_a_filter() {
        let html = Html::parse_document(
            "<input name='login' type='hidden' id='hidden'><input name='login' id='shown'>",
        );
        let list = SelectorList::parse("input[name='login']:visible").unwrap();
        let matched: Vec<_> = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| list.matches(el, |el| el.value().attr("type") != Some("hidden")))
            .filter_map(|el| el.value().id())
            .collect();
        assert_eq!(matched, vec!["shown"]);
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(SelectorList::parse("div[").is_err());
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("p:visible span").is_err());
    }
}

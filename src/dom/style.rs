//! Inline style declarations
//!
//! Only the `style` attribute is modelled. That is enough for the overlay
//! heuristic, which looks at `position`, `z-index` and the box of an element.

use crate::dom::Viewport;

/// One `property: value [!important]` entry of a style attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// Parses a `style` attribute into declarations, in source order
pub fn parse_declarations(style: &str) -> Vec<Declaration> {
    split_declarations(style)
        .into_iter()
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            if property.is_empty() {
                return None;
            }
            let value = value.trim();
            let (value, important) = match strip_important(value) {
                Some(v) => (v, true),
                None => (value, false),
            };
            Some(Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

/// Splits on `;` outside parentheses and quoted strings
///
/// Keeps values like `url(data:image/png;base64,...)` in one piece.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in style.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                parts.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&style[start..]);
    parts
}

fn strip_important(value: &str) -> Option<&str> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.rfind("!important")?;
    if lower[idx..].trim_end() != "!important" {
        return None;
    }
    Some(value[..idx].trim_end())
}

/// Returns the winning value of `property`
///
/// Later declarations override earlier ones unless the earlier one is
/// `!important` and the later one is not.
pub fn declared_value<'a>(decls: &'a [Declaration], property: &str) -> Option<&'a str> {
    let mut winner: Option<&Declaration> = None;
    for decl in decls.iter().filter(|d| d.property == property) {
        match winner {
            Some(w) if w.important && !decl.important => {}
            _ => winner = Some(decl),
        }
    }
    winner.map(|d| d.value.as_str())
}

pub fn serialize_declarations(decls: &[Declaration]) -> String {
    decls
        .iter()
        .map(|d| {
            if d.important {
                format!("{}: {} !important;", d.property, d.value)
            } else {
                format!("{}: {};", d.property, d.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sets `property` in a style attribute, replacing earlier declarations of it
pub fn set_declaration(style: &str, property: &str, value: &str, important: bool) -> String {
    let property = property.to_ascii_lowercase();
    let mut decls = parse_declarations(style);
    decls.retain(|d| d.property != property);
    decls.push(Declaration {
        property,
        value: value.to_string(),
        important,
    });
    serialize_declarations(&decls)
}

/// Resolves a CSS length to pixels
///
/// Supports `px`, unitless zero, `%` (of `reference`), `vw` and `vh`.
pub fn length_px(value: &str, reference: f64, viewport: Viewport) -> Option<f64> {
    let value = value.trim().to_ascii_lowercase();
    let number = |suffix: &str| -> Option<f64> { value.strip_suffix(suffix)?.trim().parse().ok() };

    if let Some(n) = number("px") {
        Some(n)
    } else if let Some(n) = number("%") {
        Some(n / 100.0 * reference)
    } else if let Some(n) = number("vw") {
        Some(n / 100.0 * viewport.width)
    } else if let Some(n) = number("vh") {
        Some(n / 100.0 * viewport.height)
    } else {
        value.parse::<f64>().ok().filter(|n| *n == 0.0)
    }
}

/// Expands the `inset` shorthand into (top, right, bottom, left)
pub fn expand_inset(value: &str) -> Option<[String; 4]> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let [top, right, bottom, left] = match parts.as_slice() {
        [all] => [*all, *all, *all, *all],
        [v, h] => [*v, *h, *v, *h],
        [t, h, b] => [*t, *h, *b, *h],
        [t, r, b, l] => [*t, *r, *b, *l],
        _ => return None,
    };
    Some([
        top.to_string(),
        right.to_string(),
        bottom.to_string(),
        left.to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        width: 1000.0,
        height: 500.0,
    };

    #[test]
    fn test_parse_declarations() {
        let decls = parse_declarations("position: fixed; Z-Index:1000 ; color: red !IMPORTANT;;");
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[1].property, "z-index");
        assert_eq!(decls[1].value, "1000");
        assert!(decls[2].important);
        assert_eq!(decls[2].value, "red");
    }

    #[test]
    fn test_semicolons_inside_values() {
        let style = "background: url(data:image/png;base64,AAAA) no-repeat; \
                     content: 'a;b'; overflow: hidden";
        let decls = parse_declarations(style);
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].value, "url(data:image/png;base64,AAAA) no-repeat");
        assert_eq!(decls[1].value, "'a;b'");

        let updated = set_declaration(style, "overflow", "auto", true);
        assert_eq!(
            updated,
            "background: url(data:image/png;base64,AAAA) no-repeat; content: 'a;b'; overflow: auto !important;"
        );
    }

    #[test]
    fn test_important_wins() {
        let decls = parse_declarations("overflow: hidden !important; overflow: auto");
        assert_eq!(declared_value(&decls, "overflow"), Some("hidden"));
        let decls = parse_declarations("overflow: hidden; overflow: auto");
        assert_eq!(declared_value(&decls, "overflow"), Some("auto"));
    }

    #[test]
    fn test_set_declaration_replaces() {
        let style = set_declaration("overflow: hidden !important; color: red", "overflow", "auto", true);
        assert_eq!(style, "color: red; overflow: auto !important;");
    }

    #[test]
    fn test_length_px() {
        assert_eq!(length_px("120px", 0.0, VIEWPORT), Some(120.0));
        assert_eq!(length_px("50%", 800.0, VIEWPORT), Some(400.0));
        assert_eq!(length_px("100vw", 0.0, VIEWPORT), Some(1000.0));
        assert_eq!(length_px("10vh", 0.0, VIEWPORT), Some(50.0));
        assert_eq!(length_px("0", 0.0, VIEWPORT), Some(0.0));
        assert_eq!(length_px("auto", 0.0, VIEWPORT), None);
    }

    #[test]
    fn test_expand_inset() {
        assert_eq!(
            expand_inset("0").unwrap(),
            ["0".to_string(), "0".to_string(), "0".to_string(), "0".to_string()]
        );
        assert_eq!(expand_inset("1px 2px").unwrap()[3], "2px");
        assert!(expand_inset("").is_none());
    }
}

use crate::discovery::candidate;
use serde_json::Value;
use std::collections::BTreeSet;

/// Nesting depth beyond which JSON values are not inspected
pub const MAX_JSON_DEPTH: usize = 64;

/// Adds every candidate string found in `value` to `found`
///
/// Arrays and object values are walked recursively up to [`MAX_JSON_DEPTH`];
/// object keys are ignored.
pub fn collect_json_candidates(value: &Value, found: &mut BTreeSet<String>) {
    walk(value, 0, found);
}

fn walk(value: &Value, depth: usize, found: &mut BTreeSet<String>) {
    if depth > MAX_JSON_DEPTH {
        return;
    }
    match value {
        Value::String(s) => {
            if let Ok(url) = candidate(s) {
                found.insert(url);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, depth + 1, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                walk(item, depth + 1, found);
            }
        }
        _ => {}
    }
}

/// Parses a JSON body and returns the candidate strings it contains
///
/// Used for intercepted `/_next/data/**.json` responses. Bodies that are not
/// valid JSON yield nothing.
pub fn extract_urls_from_json_bytes(body: &[u8]) -> Vec<String> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::trace!("Ignoring non-JSON data response: {}", e);
            return Vec::new();
        }
    };
    let mut found = BTreeSet::new();
    collect_json_candidates(&value, &mut found);
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walks_nested_values() {
        let value = json!({
            "/ignored-key": 1,
            "a": ["/x", {"b": "https://example.com/y"}, "plain"],
            "c": {"d": {"e": "//example.com/z"}},
        });
        let mut found = BTreeSet::new();
        collect_json_candidates(&value, &mut found);
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["//example.com/z", "/x", "https://example.com/y"]
        );
    }

    #[test]
    fn test_depth_bound() {
        let mut value = json!("/deep");
        for _ in 0..(MAX_JSON_DEPTH + 5) {
            value = json!([value]);
        }
        let mut found = BTreeSet::new();
        collect_json_candidates(&value, &mut found);
        assert!(found.is_empty());

        let mut shallow = json!("/shallow");
        for _ in 0..10 {
            shallow = json!({ "k": shallow });
        }
        collect_json_candidates(&shallow, &mut found);
        assert!(found.contains("/shallow"));
    }

    #[test]
    fn test_json_bytes() {
        let body = br#"{"pageProps":{"links":["/b","/a","/b"]}}"#;
        assert_eq!(extract_urls_from_json_bytes(body), vec!["/a", "/b"]);
        assert!(extract_urls_from_json_bytes(b"<html>").is_empty());
        assert!(extract_urls_from_json_bytes(b"").is_empty());
    }
}

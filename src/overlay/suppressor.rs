use crate::dom::{Document, DomError, MutationCallback, NodeId};
use crate::runtime::PageScript;
use std::sync::Arc;

/// Lowest z-index treated as an overlay layer
pub const MIN_Z_INDEX: i64 = 999;

/// Fraction of both viewport dimensions an overlay must cover
pub const MIN_COVERAGE: f64 = 0.9;

/// Document-scoped key under which the guard observer is registered
pub const GUARD_KEY: &str = "spa-mirror:interference-guard";

const SCROLL_PROPERTIES: &[(&str, &str)] = &[
    ("overflow", "auto"),
    ("overflow-x", "auto"),
    ("overflow-y", "auto"),
    ("position", "static"),
];

/// Runs one suppression pass over the document
///
/// 1. Forces scrolling back on for the root and body elements
/// 2. Hides every fixed-position element with `z-index >= 999` covering at
///    least 90% of the viewport in both dimensions
///
/// # Returns
///
/// The number of overlays hidden by this pass
pub fn suppress_interference(doc: &dyn Document) -> Result<usize, DomError> {
    // 1. Unlock scrolling
    for node in [doc.document_element(), doc.body()].into_iter().flatten() {
        for (property, value) in SCROLL_PROPERTIES {
            doc.set_style_property(node, property, value, true)?;
        }
    }

    // 2. Hide full-viewport overlays
    let mut hidden = 0;
    for node in doc.elements() {
        if is_overlay(doc, node) {
            doc.set_style_property(node, "display", "none", true)?;
            doc.set_style_property(node, "pointer-events", "none", true)?;
            hidden += 1;
        }
    }

    if hidden > 0 {
        tracing::debug!("Hid {} overlay element(s)", hidden);
    }
    Ok(hidden)
}

fn is_overlay(doc: &dyn Document, node: NodeId) -> bool {
    let fixed = doc
        .computed_style(node, "position")
        .is_some_and(|p| p.trim().eq_ignore_ascii_case("fixed"));
    if !fixed {
        return false;
    }

    let on_top = doc
        .computed_style(node, "z-index")
        .and_then(|z| z.trim().parse::<i64>().ok())
        .is_some_and(|z| z >= MIN_Z_INDEX);
    if !on_top {
        return false;
    }

    let viewport = doc.viewport();
    doc.bounding_box(node).is_some_and(|rect| {
        rect.width >= viewport.width * MIN_COVERAGE && rect.height >= viewport.height * MIN_COVERAGE
    })
}

/// Runs a suppression pass and keeps re-running it after every mutation
///
/// The observer is installed at most once per document; the document's
/// observer key acts as the installed flag.
///
/// # Returns
///
/// `true` if the observer was installed by this call
pub fn install_interference_guard(doc: &dyn Document) -> Result<bool, DomError> {
    suppress_interference(doc)?;

    let callback: MutationCallback =
        Arc::new(|doc: &dyn Document| suppress_interference(doc).map(|_| ()));
    Ok(doc.observe_mutations(GUARD_KEY, callback))
}

/// In-page script installing the interference guard
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppressInterference;

impl PageScript for SuppressInterference {
    fn name(&self) -> &str {
        "suppress-interference"
    }

    fn run(&self, doc: &dyn Document) -> Result<serde_json::Value, DomError> {
        let installed = install_interference_guard(doc)?;
        Ok(serde_json::json!({ "guard_installed": installed }))
    }
}

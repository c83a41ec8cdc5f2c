//! Document model for in-page scripts
//!
//! Page scripts (link extraction, interference suppression) run against the
//! [`Document`] trait rather than a concrete browser. A browser runtime hands
//! its live document to the script; the HTTP runtime uses [`HtmlDocument`],
//! a `scraper` document behind a lock.

mod html;
mod selector;
mod style;

pub use html::HtmlDocument;

use std::sync::Arc;
use thiserror::Error;

/// Identifier of a node within one document
pub type NodeId = ego_tree::NodeId;

/// Errors raised by document operations
#[derive(Debug, Error)]
pub enum DomError {
    #[error("Invalid selector {0}")]
    Selector(String),

    #[error("No such element: {0:?}")]
    NoSuchNode(NodeId),

    #[error("Script failed: {0}")]
    Script(String),
}

/// Size of the layout viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Border box of an element relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Callback invoked after child-list mutations anywhere in the document
pub type MutationCallback = Arc<dyn Fn(&dyn Document) -> Result<(), DomError> + Send + Sync>;

/// A live page document
///
/// All methods take `&self`; implementations use interior mutability so a
/// mutation observer can call back into the document it observes.
pub trait Document: Send + Sync {
    fn viewport(&self) -> Viewport;

    /// The root `<html>` element
    fn document_element(&self) -> Option<NodeId>;

    fn body(&self) -> Option<NodeId>;

    /// Every element, in document order
    fn elements(&self) -> Vec<NodeId>;

    /// Local tag name, or `None` if `node` is not an element
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Concatenated text of all descendants
    fn text_content(&self, node: NodeId) -> String;

    /// Elements matching a CSS selector, in document order
    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Computed value of a CSS property
    fn computed_style(&self, node: NodeId, property: &str) -> Option<String>;

    fn bounding_box(&self, node: NodeId) -> Option<Rect>;

    /// Sets an inline style property, optionally with `!important` priority
    fn set_style_property(
        &self,
        node: NodeId,
        property: &str,
        value: &str,
        important: bool,
    ) -> Result<(), DomError>;

    /// Current value of a form control
    fn value(&self, node: NodeId) -> Option<String>;

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError>;

    /// The framework hydration state (`__NEXT_DATA__` / `__NUXT_DATA__`)
    fn hydration_state(&self) -> Option<serde_json::Value>;

    /// Registers a child-list observer under `key`
    ///
    /// Returns false if an observer was ever registered under `key` on this
    /// document, in which case nothing is installed.
    fn observe_mutations(&self, key: &str, callback: MutationCallback) -> bool;

    /// Removes all observers; their keys stay claimed
    fn disconnect_observers(&self);

    /// Serializes the document to HTML
    fn serialize(&self) -> String;
}

use crate::dom::selector::SelectorList;
use crate::dom::style;
use crate::dom::{Document, DomError, MutationCallback, NodeId, Rect, Viewport};
use html5ever::{LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, StrTendril};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Script element ids that carry framework hydration state as JSON
const HYDRATION_SCRIPT_IDS: &[&str] = &["__NEXT_DATA__", "__NUXT_DATA__"];

/// Elements that never render a box
const NON_RENDERED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "template", "title", "meta", "link", "base", "noscript",
];

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Upper bound on re-delivery rounds when mutations arrive during delivery
const MAX_DELIVERY_ROUNDS: usize = 16;

fn element_ref(html: &Html, id: NodeId) -> Option<ElementRef<'_>> {
    html.tree.get(id).and_then(ElementRef::wrap)
}

/// Attached elements in document order
fn elements(html: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    html.tree.root().descendants().filter_map(ElementRef::wrap)
}

/// `el` followed by its element ancestors
fn self_and_ancestors<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    std::iter::once(el).chain(el.ancestors().filter_map(ElementRef::wrap))
}

fn declared(el: &ElementRef, property: &str) -> Option<String> {
    let decls = el
        .value()
        .attr("style")
        .map(style::parse_declarations)
        .unwrap_or_default();
    style::declared_value(&decls, property).map(str::to_string)
}

fn is_visible(el: &ElementRef) -> bool {
    let value = el.value();
    if value.name() == "input" && value.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return false;
    }
    if declared(el, "visibility").is_some_and(|v| v.eq_ignore_ascii_case("hidden")) {
        return false;
    }

    self_and_ancestors(*el).all(|el| {
        !NON_RENDERED_ELEMENTS.contains(&el.value().name())
            && el.value().attr("hidden").is_none()
            && !declared(&el, "display").is_some_and(|d| d.eq_ignore_ascii_case("none"))
    })
}

fn layout_box(el: &ElementRef, viewport: Viewport) -> Rect {
    let get = |property: &str| declared(el, property);
    let inset = get("inset").and_then(|v| style::expand_inset(&v));
    let side = |property: &str, idx: usize| {
        get(property).or_else(|| inset.as_ref().map(|sides| sides[idx].clone()))
    };
    let (vw, vh) = (viewport.width, viewport.height);
    let px = |value: Option<String>, reference: f64| {
        value.and_then(|v| style::length_px(&v, reference, viewport))
    };

    let top = px(side("top", 0), vh);
    let right = px(side("right", 1), vw);
    let bottom = px(side("bottom", 2), vh);
    let left = px(side("left", 3), vw);

    let width = px(get("width"), vw)
        .or_else(|| Some((vw - left? - right?).max(0.0)))
        .unwrap_or(0.0);
    let height = px(get("height"), vh)
        .or_else(|| Some((vh - top? - bottom?).max(0.0)))
        .unwrap_or(0.0);

    Rect {
        x: left.or_else(|| right.map(|r| vw - r - width)).unwrap_or(0.0),
        y: top.or_else(|| bottom.map(|b| vh - b - height)).unwrap_or(0.0),
        width,
        height,
    }
}

/// Sets a no-namespace attribute, keeping its position if it already exists
fn set_attr(element: &mut Element, name: &str, value: &str) {
    let existing = element
        .attrs
        .iter_mut()
        .find(|(key, _)| key.ns.is_empty() && &*key.local == name);
    match existing {
        Some((_, slot)) => *slot = StrTendril::from(value),
        None => {
            let key = QualName::new(None, Namespace::from(""), LocalName::from(name));
            element.attrs.insert(key, StrTendril::from(value));
        }
    }
}

fn control_value(el: &ElementRef, values: &HashMap<NodeId, String>) -> String {
    if let Some(value) = values.get(&el.id()) {
        return value.clone();
    }
    match el.value().name() {
        "textarea" => el.text().collect(),
        _ => el.value().attr("value").unwrap_or_default().to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An owned, mutable HTML document backed by a parsed [`scraper::Html`]
///
/// Styles are read from inline `style` attributes only, and boxes are laid
/// out from the inline `width`/`height`/inset properties against the
/// viewport. Child-list mutations made through [`HtmlDocument::append_element`]
/// and [`HtmlDocument::remove_node`] are delivered to registered observers.
///
/// # Example
///
/// ```
/// use spa_mirror::dom::{Document, HtmlDocument};
///
/// let doc = HtmlDocument::parse("<a href='/about'>About</a>");
/// let links = doc.query_selector_all("a").unwrap();
/// assert_eq!(doc.attribute(links[0], "href").as_deref(), Some("/about"));
/// ```
pub struct HtmlDocument {
    html: Mutex<Html>,
    /// Live values of form controls, once set
    values: Mutex<HashMap<NodeId, String>>,
    viewport: Viewport,
    observers: Mutex<Vec<MutationCallback>>,
    observer_keys: Mutex<HashSet<String>>,
    delivering: AtomicBool,
    pending: AtomicBool,
}

impl HtmlDocument {
    /// Parses a full HTML document with the default viewport
    pub fn parse(html: &str) -> Self {
        Self::parse_with_viewport(html, Viewport::default())
    }

    pub fn parse_with_viewport(html: &str, viewport: Viewport) -> Self {
        Self {
            html: Mutex::new(Html::parse_document(html)),
            values: Mutex::new(HashMap::new()),
            viewport,
            observers: Mutex::new(Vec::new()),
            observer_keys: Mutex::new(HashSet::new()),
            delivering: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    /// Appends a new HTML element under `parent` and notifies observers
    pub fn append_element(
        &self,
        parent: NodeId,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<NodeId, DomError> {
        let id = {
            let mut html = lock(&self.html);
            if element_ref(&html, parent).is_none() {
                return Err(DomError::NoSuchNode(parent));
            }
            let name = QualName::new(
                None,
                Namespace::from(HTML_NAMESPACE),
                LocalName::from(tag.to_ascii_lowercase().as_str()),
            );
            let mut element = Element::new(name, Vec::new());
            for (key, value) in attributes {
                set_attr(&mut element, key, value);
            }
            let mut parent = html.tree.get_mut(parent).ok_or(DomError::NoSuchNode(parent))?;
            parent.append(Node::Element(element)).id()
        };
        self.notify_mutation();
        Ok(id)
    }

    /// Detaches `node` from the tree and notifies observers
    pub fn remove_node(&self, node: NodeId) -> Result<(), DomError> {
        {
            let mut html = lock(&self.html);
            let mut target = html.tree.get_mut(node).ok_or(DomError::NoSuchNode(node))?;
            if target.parent().is_none() {
                return Err(DomError::NoSuchNode(node));
            }
            target.detach();
        }
        self.notify_mutation();
        Ok(())
    }

    /// Number of connected observers
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Current `(name, value)` pairs of named controls inside a form
    pub fn form_values(&self, form: NodeId) -> Vec<(String, String)> {
        let html = lock(&self.html);
        let values = lock(&self.values);
        let Some(form) = element_ref(&html, form) else {
            return Vec::new();
        };
        form.descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "input" | "textarea" | "select"))
            .filter_map(|el| {
                let name = el.value().attr("name")?.to_string();
                Some((name, control_value(&el, &values)))
            })
            .collect()
    }

    /// Nearest `<form>` ancestor of `node`, including itself
    pub fn enclosing_form(&self, node: NodeId) -> Option<NodeId> {
        let html = lock(&self.html);
        let el = element_ref(&html, node)?;
        let form = self_and_ancestors(el)
            .find(|el| el.value().name() == "form")
            .map(|el| el.id());
        form
    }

    fn notify_mutation(&self) {
        if self.delivering.swap(true, Ordering::SeqCst) {
            self.pending.store(true, Ordering::SeqCst);
            return;
        }

        for _ in 0..MAX_DELIVERY_ROUNDS {
            self.pending.store(false, Ordering::SeqCst);
            let callbacks: Vec<MutationCallback> = lock(&self.observers).clone();
            for callback in callbacks {
                match panic::catch_unwind(AssertUnwindSafe(|| callback(self as &dyn Document))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::trace!("Mutation observer failed: {}", e),
                    Err(_) => tracing::trace!("Mutation observer panicked"),
                }
            }
            if !self.pending.load(Ordering::SeqCst) {
                break;
            }
        }

        self.delivering.store(false, Ordering::SeqCst);
    }
}

impl Document for HtmlDocument {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn document_element(&self) -> Option<NodeId> {
        let html = lock(&self.html);
        let root = html
            .tree
            .root()
            .children()
            .find(|child| child.value().is_element())?;
        Some(root.id())
    }

    fn body(&self) -> Option<NodeId> {
        let html = lock(&self.html);
        let body = elements(&html).find(|el| el.value().name() == "body")?;
        Some(body.id())
    }

    fn elements(&self) -> Vec<NodeId> {
        elements(&lock(&self.html)).map(|el| el.id()).collect()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        let html = lock(&self.html);
        let el = element_ref(&html, node)?;
        Some(el.value().name().to_string())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let html = lock(&self.html);
        let el = element_ref(&html, node)?;
        el.value().attr(name).map(str::to_string)
    }

    fn text_content(&self, node: NodeId) -> String {
        let html = lock(&self.html);
        element_ref(&html, node)
            .map(|el| el.text().collect())
            .unwrap_or_default()
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        let html = lock(&self.html);
        Ok(elements(&html)
            .filter(|el| list.matches(el, is_visible))
            .map(|el| el.id())
            .collect())
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        let html = lock(&self.html);
        let el = element_ref(&html, node)?;
        let property = property.to_ascii_lowercase();
        if let Some(value) = declared(&el, &property) {
            return Some(value);
        }
        let default = match property.as_str() {
            "position" => "static",
            "z-index" => "auto",
            "overflow" | "overflow-x" | "overflow-y" | "visibility" => "visible",
            "pointer-events" => "auto",
            "display" if NON_RENDERED_ELEMENTS.contains(&el.value().name()) => "none",
            "display" => "block",
            _ => return None,
        };
        Some(default.to_string())
    }

    fn bounding_box(&self, node: NodeId) -> Option<Rect> {
        let html = lock(&self.html);
        let el = element_ref(&html, node)?;
        Some(layout_box(&el, self.viewport))
    }

    fn set_style_property(
        &self,
        node: NodeId,
        property: &str,
        value: &str,
        important: bool,
    ) -> Result<(), DomError> {
        let mut html = lock(&self.html);
        let mut target = html.tree.get_mut(node).ok_or(DomError::NoSuchNode(node))?;
        let Node::Element(el) = target.value() else {
            return Err(DomError::NoSuchNode(node));
        };
        let updated = style::set_declaration(el.attr("style").unwrap_or_default(), property, value, important);
        set_attr(el, "style", &updated);
        Ok(())
    }

    fn value(&self, node: NodeId) -> Option<String> {
        let html = lock(&self.html);
        let values = lock(&self.values);
        let el = element_ref(&html, node)?;
        Some(control_value(&el, &values))
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<(), DomError> {
        if element_ref(&lock(&self.html), node).is_none() {
            return Err(DomError::NoSuchNode(node));
        }
        lock(&self.values).insert(node, value.to_string());
        Ok(())
    }

    fn hydration_state(&self) -> Option<serde_json::Value> {
        let html = lock(&self.html);
        let found = elements(&html).find_map(|el| {
            let is_state = el.value().name() == "script"
                && el
                    .value()
                    .attr("id")
                    .is_some_and(|v| HYDRATION_SCRIPT_IDS.contains(&v));
            if !is_state {
                return None;
            }
            match serde_json::from_str(&el.text().collect::<String>()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::trace!("Ignoring unparsable hydration script: {}", e);
                    None
                }
            }
        });
        found
    }

    fn observe_mutations(&self, key: &str, callback: MutationCallback) -> bool {
        if !lock(&self.observer_keys).insert(key.to_string()) {
            return false;
        }
        lock(&self.observers).push(callback);
        true
    }

    fn disconnect_observers(&self) {
        lock(&self.observers).clear();
    }

    fn serialize(&self) -> String {
        lock(&self.html).html()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_serialize_round_trip() {
        let doc = HtmlDocument::parse(
            "<!DOCTYPE html><html><head><script>if (a < b && c) {}</script></head>\
             <body><p class=\"x\">a &amp; b</p><img src=\"/i.png\"><!-- note --></body></html>",
        );
        let html = doc.serialize();
        assert!(html.starts_with("<!DOCTYPE html><html>"));
        assert!(html.contains("<script>if (a < b && c) {}</script>"));
        assert!(html.contains("<p class=\"x\">a &amp; b</p>"));
        assert!(html.contains("<img src=\"/i.png\"><!-- note -->"));
        assert!(!html.contains("</img>"));
    }

    #[test]
    fn test_serialize_keeps_svg_names() {
        let doc = HtmlDocument::parse(
            "<body><svg viewBox='0 0 1 1'><defs><linearGradient id='g'></linearGradient></defs>\
             <use xlink:href='#g'></use></svg></body>",
        );
        let html = doc.serialize();
        assert!(html.contains("<svg viewBox=\"0 0 1 1\">"), "{}", html);
        assert!(html.contains("<linearGradient id=\"g\">"), "{}", html);
        assert!(html.contains("xlink:href=\"#g\""), "{}", html);
    }

    #[test]
    fn test_serialize_keeps_attribute_order() {
        let source = "<body><a href=\"/x\" class=\"c\" data-id=\"1\" title=\"t\">x</a></body>";
        let first = HtmlDocument::parse(source).serialize();
        assert!(first.contains(source.trim_start_matches("<body>").trim_end_matches("</body>")));
        assert_eq!(first, HtmlDocument::parse(source).serialize());
    }

    #[test]
    fn test_structure_queries() {
        let doc = HtmlDocument::parse("<html><body><div id='a'><span>hi</span></div></body></html>");
        let root = doc.document_element().unwrap();
        assert_eq!(doc.tag_name(root).as_deref(), Some("html"));
        let body = doc.body().unwrap();
        assert_eq!(doc.tag_name(body).as_deref(), Some("body"));
        let div = doc.query_selector_all("#a").unwrap()[0];
        assert_eq!(doc.text_content(div), "hi");
        assert!(doc.query_selector_all("div[").is_err());
    }

    #[test]
    fn test_visible_filter() {
        let doc = HtmlDocument::parse(
            "<form><input name='login' type='hidden'>\
             <div style='display: none'><input name='login'></div>\
             <input name='login' id='real'><input name='password' hidden></form>",
        );
        let found = doc.query_selector_all("input[name='login']:visible").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(doc.attribute(found[0], "id").as_deref(), Some("real"));
        assert!(doc
            .query_selector_all("input[name='password']:visible")
            .unwrap()
            .is_empty());
        assert_eq!(doc.query_selector_all("input, form").unwrap().len(), 5);
    }

    #[test]
    fn test_hydration_state() {
        let doc = HtmlDocument::parse(
            r#"<script id="__NEXT_DATA__" type="application/json">{"page":"/a","props":{"next":"/c"}}</script>"#,
        );
        let state = doc.hydration_state().unwrap();
        assert_eq!(state["props"]["next"], "/c");

        let broken = HtmlDocument::parse(r#"<script id="__NEXT_DATA__">{not json</script>"#);
        assert!(broken.hydration_state().is_none());
    }

    #[test]
    fn test_bounding_box_from_inline_style() {
        let doc = HtmlDocument::parse_with_viewport(
            "<div id='full' style='position:fixed; inset:0'></div>\
             <div id='half' style='position:fixed; width:50%; height:50vh; top:10px'></div>\
             <div id='sized' style='position:fixed; left:0; right:0; top:0; bottom:0'></div>",
            Viewport {
                width: 1000.0,
                height: 800.0,
            },
        );
        let rect = |sel: &str| doc.bounding_box(doc.query_selector_all(sel).unwrap()[0]).unwrap();

        let full = rect("#full");
        assert_eq!((full.width, full.height), (1000.0, 800.0));
        let half = rect("#half");
        assert_eq!((half.width, half.height, half.y), (500.0, 400.0, 10.0));
        let sized = rect("#sized");
        assert_eq!((sized.width, sized.height), (1000.0, 800.0));
    }

    #[test]
    fn test_style_properties() {
        let doc = HtmlDocument::parse("<body style='overflow: hidden'></body>");
        let body = doc.body().unwrap();
        assert_eq!(doc.computed_style(body, "overflow").as_deref(), Some("hidden"));
        assert_eq!(doc.computed_style(body, "position").as_deref(), Some("static"));

        doc.set_style_property(body, "overflow", "auto", true).unwrap();
        assert_eq!(doc.computed_style(body, "overflow").as_deref(), Some("auto"));
        assert_eq!(
            doc.attribute(body, "style").as_deref(),
            Some("overflow: auto !important;")
        );

        let head = doc.query_selector_all("head").unwrap()[0];
        doc.set_style_property(head, "color", "red", false).unwrap();
        assert_eq!(doc.attribute(head, "style").as_deref(), Some("color: red;"));
    }

    #[test]
    fn test_values_and_forms() {
        let doc = HtmlDocument::parse(
            "<form action='/session'><input name='login' value='x'><input name='password'>\
             <textarea name='note'>hi</textarea></form>",
        );
        let inputs = doc.query_selector_all("input").unwrap();
        assert_eq!(doc.value(inputs[0]).as_deref(), Some("x"));
        doc.set_value(inputs[1], "secret").unwrap();

        let form = doc.enclosing_form(inputs[1]).unwrap();
        assert_eq!(
            doc.form_values(form),
            vec![
                ("login".to_string(), "x".to_string()),
                ("password".to_string(), "secret".to_string()),
                ("note".to_string(), "hi".to_string()),
            ]
        );
    }

    #[test]
    fn test_observers_fire_once_per_key() {
        let doc = HtmlDocument::parse("<body></body>");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: MutationCallback = Arc::new(move |_: &dyn Document| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(doc.observe_mutations("guard", callback.clone()));
        assert!(!doc.observe_mutations("guard", callback));

        let body = doc.body().unwrap();
        let div = doc.append_element(body, "div", &[]).unwrap();
        doc.remove_node(div).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(doc.query_selector_all("div").unwrap().is_empty());
        assert!(doc.remove_node(div).is_err());

        doc.disconnect_observers();
        assert_eq!(doc.observer_count(), 0);
        doc.append_element(body, "div", &[]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_appended_elements_serialize() {
        let doc = HtmlDocument::parse("<body></body>");
        let body = doc.body().unwrap();
        doc.append_element(body, "DIV", &[("id", "late"), ("style", "color: red")])
            .unwrap();
        assert_eq!(doc.query_selector_all("#late").unwrap().len(), 1);
        assert!(doc
            .serialize()
            .contains("<div id=\"late\" style=\"color: red\"></div>"));
    }

    #[test]
    fn test_observer_failures_are_swallowed() {
        let doc = HtmlDocument::parse("<body></body>");
        doc.observe_mutations(
            "panics",
            Arc::new(|_: &dyn Document| -> Result<(), DomError> { panic!("boom") }),
        );
        doc.observe_mutations(
            "fails",
            Arc::new(|_: &dyn Document| Err(DomError::Script("nope".to_string()))),
        );
        let body = doc.body().unwrap();
        assert!(doc.append_element(body, "div", &[]).is_ok());
        assert_eq!(doc.query_selector_all("div").unwrap().len(), 1);
    }
}

//! Browser runtime abstraction
//!
//! The crawler and the session pool drive pages through the [`Browser`],
//! [`BrowserContext`] and [`Page`] traits. In-page work is expressed as a
//! [`PageScript`] evaluated against the page's live [`Document`].
//!
//! [`HttpBrowser`] implements the traits on top of `reqwest` and `scraper`:
//! it does not execute JavaScript, but it keeps cookies per context, loads
//! same-origin subresources and submits forms, which is enough for
//! server-rendered pages and for form-based logins.

mod http;

pub use http::{build_http_client, HttpBrowser, HttpContext, HttpPage};

use crate::dom::{Document, DomError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors raised by a browser runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("No document is loaded in this page")]
    NoDocument,

    #[error("No element matches '{0}'")]
    ElementNotFound(String),

    #[error("Page script '{name}' failed: {source}")]
    Script { name: String, source: DomError },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Browser context is closed")]
    Closed,
}

/// A cookie as exchanged between contexts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Outcome of a top-level navigation
#[derive(Debug, Clone)]
pub struct Navigation {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
}

/// What kind of request produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Fetch,
    Other,
}

impl ResourceType {
    /// Guesses the resource type from a `Content-Type` header value
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type.map(|c| c.to_ascii_lowercase()) else {
            return ResourceType::Other;
        };
        if ct.contains("html") {
            ResourceType::Document
        } else if ct.contains("javascript") || ct.contains("ecmascript") {
            ResourceType::Script
        } else if ct.contains("css") {
            ResourceType::Stylesheet
        } else if ct.starts_with("image/") {
            ResourceType::Image
        } else if ct.starts_with("font/") || ct.contains("woff") {
            ResourceType::Font
        } else if ct.starts_with("video/") || ct.starts_with("audio/") {
            ResourceType::Media
        } else if ct.contains("json") {
            ResourceType::Fetch
        } else {
            ResourceType::Other
        }
    }
}

/// A response observed by a page
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub resource_type: ResourceType,
}

impl InterceptedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Callback receiving every response a page observes
pub type ResponseHandler = Arc<dyn Fn(InterceptedResponse) + Send + Sync>;

/// Predicate over the page URL used by [`Page::wait_for_url`]
pub type UrlPredicate = dyn Fn(&Url) -> bool + Send + Sync;

/// Work executed inside a page against its live document
pub trait PageScript: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, doc: &dyn Document) -> Result<serde_json::Value, DomError>;
}

/// A browser engine that can create isolated contexts
#[async_trait]
pub trait Browser: Send + Sync {
    /// Creates a context with its own cookie store
    async fn new_context(&self) -> Result<Arc<dyn BrowserContext>, RuntimeError>;
}

/// An isolated browsing context (its own cookies)
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, RuntimeError>;

    /// Cookies that would be sent to `url`
    async fn cookies(&self, url: &Url) -> Result<Vec<Cookie>, RuntimeError>;

    async fn set_cookies(&self, url: &Url, cookies: &[Cookie]) -> Result<(), RuntimeError>;

    /// Fetches a URL with the context's cookies, outside any page
    async fn fetch(&self, url: &Url, timeout: Duration)
        -> Result<InterceptedResponse, RuntimeError>;

    async fn close(&self) -> Result<(), RuntimeError>;
}

/// A single page (tab) within a context
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates to `url` and waits for the document to load
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<Navigation, RuntimeError>;

    /// Best-effort wait until no requests are in flight
    async fn wait_for_network_idle(&mut self, _timeout: Duration) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Current URL, if a document is loaded
    fn url(&self) -> Option<Url>;

    async fn evaluate(&self, script: &dyn PageScript) -> Result<serde_json::Value, RuntimeError>;

    /// Serialized HTML of the current document
    async fn content(&self) -> Result<String, RuntimeError>;

    /// Clears the first input matching `selector` and types `text` into it
    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        delay: Duration,
    ) -> Result<(), RuntimeError>;

    /// Current value of the first input matching `selector`
    async fn input_value(&self, selector: &str) -> Result<String, RuntimeError>;

    /// Presses Enter in the first element matching `selector`
    async fn press_enter(&mut self, selector: &str) -> Result<(), RuntimeError>;

    /// Waits until the page URL satisfies `predicate`
    async fn wait_for_url(
        &mut self,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> Result<Url, RuntimeError>;

    /// Registers a handler for every response the page observes
    fn on_response(&mut self, handler: ResponseHandler);

    async fn close(&mut self) -> Result<(), RuntimeError>;
}

use crate::discovery::extract_links;
use crate::dom::{Document, HtmlDocument, NodeId, Viewport};
use crate::runtime::{
    Browser, BrowserContext, Cookie, InterceptedResponse, Navigation, Page, PageScript,
    ResourceType, ResponseHandler, RuntimeError, UrlPredicate,
};
use crate::url::looks_like_asset;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

const MAX_REDIRECTS: usize = 10;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(250);
const SUBRESOURCE_CONCURRENCY: usize = 8;
const FORM_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const URL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the HTTP client backing one browser context
///
/// # Arguments
///
/// * `user_agent` - Value of the `User-Agent` header
/// * `jar` - Cookie store shared by every request of the context
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, jar: Arc<Jar>) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .cookie_provider(jar)
        .gzip(true)
        .brotli(true)
        .build()
}

/// A browser runtime that speaks plain HTTP
///
/// Pages are fetched with `reqwest` and parsed into [`HtmlDocument`]s. No
/// JavaScript runs, so content rendered purely on the client is not seen;
/// hydration state embedded in the HTML still is.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    user_agent: String,
    viewport: Viewport,
}

impl HttpBrowser {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport: Viewport::default(),
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_context(&self) -> Result<Arc<dyn BrowserContext>, RuntimeError> {
        let jar = Arc::new(Jar::default());
        let client = build_http_client(&self.user_agent, jar.clone())?;
        Ok(Arc::new(HttpContext {
            inner: Arc::new(ContextInner {
                client,
                jar,
                viewport: self.viewport,
                closed: AtomicBool::new(false),
            }),
        }))
    }
}

struct ContextInner {
    client: Client,
    jar: Arc<Jar>,
    viewport: Viewport,
    closed: AtomicBool,
}

impl ContextInner {
    fn ensure_open(&self) -> Result<(), RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(RuntimeError::Closed)
        } else {
            Ok(())
        }
    }

    /// Sends a request, retrying server errors and timeouts
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 5xx | Retry up to `attempts` times |
    /// | Timeout / connect error | Retry up to `attempts` times |
    /// | Anything else | Returned as is |
    async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
        attempts: u32,
    ) -> Result<InterceptedResponse, RuntimeError> {
        self.ensure_open()?;

        let mut attempt = 1;
        loop {
            let Some(req) = request.try_clone() else {
                return read_response(request.timeout(timeout).send().await?).await;
            };

            match req.timeout(timeout).send().await {
                Ok(resp) if resp.status().is_server_error() && attempt < attempts => {
                    tracing::debug!(
                        "Server error {} from {} (attempt {}/{})",
                        resp.status(),
                        resp.url(),
                        attempt,
                        attempts
                    );
                }
                Ok(resp) => return read_response(resp).await,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < attempts => {
                    tracing::debug!("Request failed (attempt {}/{}): {}", attempt, attempts, e);
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(RETRY_DELAY * attempt).await;
            attempt += 1;
        }
    }
}

async fn read_response(resp: reqwest::Response) -> Result<InterceptedResponse, RuntimeError> {
    let url = resp.url().clone();
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.bytes().await?.to_vec();
    let resource_type = ResourceType::from_content_type(content_type.as_deref());

    Ok(InterceptedResponse {
        url,
        status,
        content_type,
        body,
        resource_type,
    })
}

/// A context of [`HttpBrowser`]: one HTTP client and one cookie jar
pub struct HttpContext {
    inner: Arc<ContextInner>,
}

#[async_trait]
impl BrowserContext for HttpContext {
    async fn new_page(&self) -> Result<Box<dyn Page>, RuntimeError> {
        self.inner.ensure_open()?;
        Ok(Box::new(HttpPage {
            inner: self.inner.clone(),
            document: None,
            url: None,
            handlers: Vec::new(),
        }))
    }

    async fn cookies(&self, url: &Url) -> Result<Vec<Cookie>, RuntimeError> {
        let Some(header) = self.inner.jar.cookies(url) else {
            return Ok(Vec::new());
        };
        let header = header.to_str().unwrap_or_default();
        Ok(header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some(Cookie::new(name, value))
            })
            .collect())
    }

    async fn set_cookies(&self, url: &Url, cookies: &[Cookie]) -> Result<(), RuntimeError> {
        self.inner.ensure_open()?;
        for cookie in cookies {
            self.inner
                .jar
                .add_cookie_str(&format!("{}={}; Path=/", cookie.name, cookie.value), url);
        }
        Ok(())
    }

    async fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<InterceptedResponse, RuntimeError> {
        let request = self.inner.client.get(url.clone());
        self.inner.send(request, timeout, MAX_ATTEMPTS).await
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A page of [`HttpBrowser`]
pub struct HttpPage {
    inner: Arc<ContextInner>,
    document: Option<HtmlDocument>,
    url: Option<Url>,
    handlers: Vec<ResponseHandler>,
}

impl HttpPage {
    fn document(&self) -> Result<&HtmlDocument, RuntimeError> {
        self.document.as_ref().ok_or(RuntimeError::NoDocument)
    }

    fn first_match(&self, selector: &str) -> Result<NodeId, RuntimeError> {
        let doc = self.document()?;
        let nodes = doc
            .query_selector_all(selector)
            .map_err(|source| RuntimeError::Script {
                name: "query-selector".to_string(),
                source,
            })?;
        nodes
            .first()
            .copied()
            .ok_or_else(|| RuntimeError::ElementNotFound(selector.to_string()))
    }

    fn emit(&self, response: &InterceptedResponse) {
        for handler in &self.handlers {
            handler(response.clone());
        }
    }

    /// Loads a document response, then its same-origin subresources
    async fn load(
        &mut self,
        request: RequestBuilder,
        timeout: Duration,
        attempts: u32,
    ) -> Result<Navigation, RuntimeError> {
        // 1. Fetch the document
        let response = self.inner.send(request, timeout, attempts).await?;
        let navigation = Navigation {
            url: response.url.clone(),
            status: response.status,
            content_type: response.content_type.clone(),
        };

        // 2. Replace the current document
        if let Some(old) = self.document.take() {
            old.disconnect_observers();
        }
        let is_html = matches!(
            response.resource_type,
            ResourceType::Document | ResourceType::Other
        ) && response.content_type.as_deref().map_or(true, |ct| ct.contains("html"));
        let subresources = if is_html {
            let doc = HtmlDocument::parse_with_viewport(
                &String::from_utf8_lossy(&response.body),
                self.inner.viewport,
            );
            let targets = subresource_targets(&doc, &response.url);
            self.document = Some(doc);
            targets
        } else {
            Vec::new()
        };
        self.url = Some(response.url.clone());
        self.emit(&response);

        // 3. Load subresources like a browser would
        let inner = self.inner.clone();
        let results: Vec<_> = stream::iter(subresources)
            .map(move |target| {
                let inner = inner.clone();
                async move {
                    let request = inner.client.get(target.clone());
                    let result = inner.send(request, timeout, 1).await;
                    (target, result)
                }
            })
            .buffer_unordered(SUBRESOURCE_CONCURRENCY)
            .collect()
            .await;

        for (target, result) in results {
            match result {
                Ok(resp) => self.emit(&resp),
                Err(e) => tracing::trace!("Subresource {} failed: {}", target, e),
            }
        }

        Ok(navigation)
    }
}

/// Same-origin asset URLs referenced by a document
fn subresource_targets(doc: &HtmlDocument, page_url: &Url) -> Vec<Url> {
    let targets: BTreeSet<Url> = extract_links(doc)
        .iter()
        .filter_map(|raw| page_url.join(raw).ok())
        .filter(|url| url.origin() == page_url.origin() && looks_like_asset(url.path()))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect();
    targets.into_iter().collect()
}

#[async_trait]
impl Page for HttpPage {
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<Navigation, RuntimeError> {
        let request = self.inner.client.get(url.clone());
        self.load(request, timeout, MAX_ATTEMPTS)
            .await
            .map_err(|e| match e {
                RuntimeError::Http(err) => RuntimeError::Navigation {
                    url: url.to_string(),
                    reason: err.to_string(),
                },
                other => other,
            })
    }

    fn url(&self) -> Option<Url> {
        self.url.clone()
    }

    async fn evaluate(&self, script: &dyn PageScript) -> Result<serde_json::Value, RuntimeError> {
        let doc = self.document()?;
        script.run(doc).map_err(|source| RuntimeError::Script {
            name: script.name().to_string(),
            source,
        })
    }

    async fn content(&self) -> Result<String, RuntimeError> {
        Ok(self.document()?.serialize())
    }

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        delay: Duration,
    ) -> Result<(), RuntimeError> {
        let node = self.first_match(selector)?;
        if !delay.is_zero() {
            let keystrokes = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
            tokio::time::sleep(delay.saturating_mul(keystrokes)).await;
        }
        self.document()?
            .set_value(node, text)
            .map_err(|source| RuntimeError::Script {
                name: "type".to_string(),
                source,
            })
    }

    async fn input_value(&self, selector: &str) -> Result<String, RuntimeError> {
        let node = self.first_match(selector)?;
        Ok(self.document()?.value(node).unwrap_or_default())
    }

    async fn press_enter(&mut self, selector: &str) -> Result<(), RuntimeError> {
        // 1. Find the form the element belongs to
        let node = self.first_match(selector)?;
        let doc = self.document()?;
        let form = doc
            .enclosing_form(node)
            .ok_or_else(|| RuntimeError::ElementNotFound(format!("form around '{}'", selector)))?;

        // 2. Build the submission from the live control values
        let base = self.url.clone().ok_or(RuntimeError::NoDocument)?;
        let target = match doc.attribute(form, "action").filter(|a| !a.trim().is_empty()) {
            Some(action) => base.join(&action)?,
            None => base,
        };
        let values = doc.form_values(form);
        let method = doc
            .attribute(form, "method")
            .unwrap_or_default()
            .to_ascii_lowercase();

        let request = if method == "post" {
            self.inner.client.post(target).form(&values)
        } else {
            let mut target = target;
            target
                .query_pairs_mut()
                .clear()
                .extend_pairs(values.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            self.inner.client.get(target)
        };

        // 3. Follow the response like a navigation
        tracing::debug!("Submitting form via {}", if method == "post" { "POST" } else { "GET" });
        self.load(request, FORM_SUBMIT_TIMEOUT, 1).await?;
        Ok(())
    }

    async fn wait_for_url(
        &mut self,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> Result<Url, RuntimeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(url) = &self.url {
                if predicate(url) {
                    return Ok(url.clone());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RuntimeError::Timeout {
                    what: "URL change".to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(URL_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn on_response(&mut self, handler: ResponseHandler) {
        self.handlers.push(handler);
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        if let Some(doc) = self.document.take() {
            doc.disconnect_observers();
        }
        self.handlers.clear();
        Ok(())
    }
}

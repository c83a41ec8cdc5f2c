//! In-memory browser used by session tests
//!
//! Pages on `/login` show a form with `input[name='login']` and
//! `input[name='password']`. Submitting the right credentials redirects to
//! `/home` and sets a `session=ok` cookie; a context holding that cookie is
//! redirected away from `/login` on arrival.

use crate::dom::{Document, HtmlDocument};
use crate::runtime::{
    Browser, BrowserContext, Cookie, InterceptedResponse, Navigation, Page, PageScript,
    ResponseHandler, RuntimeError, UrlPredicate,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub(crate) const USERNAME: &str = "alice";
pub(crate) const PASSWORD: &str = "secret";

#[derive(Default)]
pub(crate) struct FakeSite {
    /// Successful form submissions
    pub logins: AtomicUsize,
    /// Contexts created
    pub contexts: AtomicUsize,
    /// Reject every submission and every existing session while set
    pub reject: AtomicBool,
    /// Number of fills the login form wipes before keeping input
    pub rerenders: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBrowser {
    pub site: Arc<FakeSite>,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_context(&self) -> Result<Arc<dyn BrowserContext>, RuntimeError> {
        self.site.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            site: self.site.clone(),
            cookies: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

pub(crate) struct FakeContext {
    site: Arc<FakeSite>,
    cookies: Arc<Mutex<Vec<Cookie>>>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> Result<Box<dyn Page>, RuntimeError> {
        Ok(Box::new(FakePage {
            site: self.site.clone(),
            cookies: self.cookies.clone(),
            url: None,
            values: HashMap::new(),
        }))
    }

    async fn cookies(&self, _url: &Url) -> Result<Vec<Cookie>, RuntimeError> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn set_cookies(&self, _url: &Url, cookies: &[Cookie]) -> Result<(), RuntimeError> {
        self.cookies.lock().unwrap().extend_from_slice(cookies);
        Ok(())
    }

    async fn fetch(
        &self,
        _url: &Url,
        _timeout: Duration,
    ) -> Result<InterceptedResponse, RuntimeError> {
        Err(RuntimeError::NoDocument)
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

struct FakePage {
    site: Arc<FakeSite>,
    cookies: Arc<Mutex<Vec<Cookie>>>,
    url: Option<Url>,
    values: HashMap<String, String>,
}

impl FakePage {
    fn has_session(&self) -> bool {
        !self.site.reject.load(Ordering::SeqCst)
            && self
                .cookies
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.name == "session" && c.value == "ok")
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&mut self, url: &Url, _timeout: Duration) -> Result<Navigation, RuntimeError> {
        let landed = if url.path() == "/login" && self.has_session() {
            url.join("/home")?
        } else {
            url.clone()
        };
        self.url = Some(landed.clone());
        self.values.clear();
        Ok(Navigation {
            url: landed,
            status: 200,
            content_type: Some("text/html".to_string()),
        })
    }

    fn url(&self) -> Option<Url> {
        self.url.clone()
    }

    async fn evaluate(&self, script: &dyn PageScript) -> Result<serde_json::Value, RuntimeError> {
        let doc = HtmlDocument::parse("<html><body></body></html>");
        script
            .run(&doc as &dyn Document)
            .map_err(|source| RuntimeError::Script {
                name: script.name().to_string(),
                source,
            })
    }

    async fn content(&self) -> Result<String, RuntimeError> {
        Ok("<html><body></body></html>".to_string())
    }

    async fn type_text(
        &mut self,
        selector: &str,
        text: &str,
        _delay: Duration,
    ) -> Result<(), RuntimeError> {
        let wiped = self
            .site
            .rerenders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let value = if wiped { String::new() } else { text.to_string() };
        self.values.insert(selector.to_string(), value);
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> Result<String, RuntimeError> {
        Ok(self.values.get(selector).cloned().unwrap_or_default())
    }

    async fn press_enter(&mut self, _selector: &str) -> Result<(), RuntimeError> {
        let submitted: Vec<&String> = self.values.values().collect();
        let accepted = !self.site.reject.load(Ordering::SeqCst)
            && submitted.iter().any(|v| v.as_str() == USERNAME)
            && submitted.iter().any(|v| v.as_str() == PASSWORD);
        if accepted {
            self.site.logins.fetch_add(1, Ordering::SeqCst);
            self.cookies
                .lock()
                .unwrap()
                .push(Cookie::new("session", "ok"));
            self.url = match &self.url {
                Some(url) => Some(url.join("/home")?),
                None => None,
            };
        }
        Ok(())
    }

    async fn wait_for_url(
        &mut self,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> Result<Url, RuntimeError> {
        match &self.url {
            Some(url) if predicate(url) => Ok(url.clone()),
            _ => Err(RuntimeError::Timeout {
                what: "URL change".to_string(),
                after: timeout,
            }),
        }
    }

    fn on_response(&mut self, _handler: ResponseHandler) {}

    async fn close(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

use crate::config::{LoginConfig, SessionConfig};
use crate::runtime::{BrowserContext, Page, RuntimeError};
use crate::session::SessionError;
use crate::url::is_login_url;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Pause between attempts to fill a form that keeps rerendering
const FILL_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Drives the login form of the mirrored site
#[derive(Debug, Clone)]
pub struct Authenticator {
    login: LoginConfig,
    login_url: Url,
    navigation_timeout: Duration,
    login_wait_timeout: Duration,
    form_stabilize_timeout: Duration,
    rerender_timeout: Duration,
}

impl Authenticator {
    /// Creates an authenticator for the site at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Origin of the mirrored site
    /// * `login` - Login route, credentials and input selectors
    /// * `session` - Login timeouts
    /// * `navigation_timeout` - Timeout for loading the login page
    pub fn new(
        base_url: &Url,
        login: LoginConfig,
        session: &SessionConfig,
        navigation_timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            login_url: base_url.join(&login.path)?,
            login,
            navigation_timeout,
            login_wait_timeout: Duration::from_millis(session.login_wait_timeout),
            form_stabilize_timeout: Duration::from_millis(session.form_stabilize_timeout),
            rerender_timeout: Duration::from_millis(session.rerender_timeout),
        })
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    /// Returns true if `url` is on the login route
    pub fn is_login_url(&self, url: &Url) -> bool {
        is_login_url(url, &self.login.path)
    }

    /// Logs a context in
    ///
    /// # Login Flow
    ///
    /// 1. Open the login page and let the client-side rerender settle
    /// 2. If the page already left the login route, the context is logged in
    /// 3. Fill username and password until both read back intact
    /// 4. Press Enter in the password input
    /// 5. Wait for a URL outside the login route
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The context is authenticated
    /// * `Err(SessionError::LoginTimeout)` - The form never stabilised or the
    ///   site never left the login route
    pub async fn login(&self, context: &dyn BrowserContext, slot: usize) -> Result<(), SessionError> {
        let mut page = context.new_page().await?;
        let result = self.run_flow(page.as_mut(), slot).await;
        if let Err(e) = page.close().await {
            tracing::debug!("Closing login page on slot {} failed: {}", slot, e);
        }
        result
    }

    async fn run_flow(&self, page: &mut dyn Page, slot: usize) -> Result<(), SessionError> {
        // 1. Open the login page
        page.navigate(&self.login_url, self.navigation_timeout).await?;
        if let Err(e) = page.wait_for_network_idle(self.navigation_timeout).await {
            tracing::debug!("Network did not go idle on login page: {}", e);
        }
        tokio::time::sleep(self.rerender_timeout).await;

        // 2. Already logged in?
        if page.url().is_some_and(|u| !self.is_login_url(&u)) {
            tracing::debug!("Slot {} is already authenticated", slot);
            return Ok(());
        }

        // 3. Fill the form until it holds both values
        self.fill_stable(page, slot).await?;

        // 4. Submit
        page.press_enter(&self.login.password_selector).await?;

        // 5. Wait for the redirect away from the login route
        let login_path = self.login.path.clone();
        let left_login = move |url: &Url| !is_login_url(url, &login_path);
        match page.wait_for_url(&left_login, self.login_wait_timeout).await {
            Ok(url) => {
                tracing::info!("Slot {} logged in (landed on {})", slot, url.path());
                Ok(())
            }
            Err(RuntimeError::Timeout { .. }) => Err(SessionError::LoginTimeout {
                slot,
                waited: self.login_wait_timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Types both credentials, retrying while the form rerenders and wipes them
    async fn fill_stable(&self, page: &mut dyn Page, slot: usize) -> Result<(), SessionError> {
        let delay = Duration::from_millis(self.login.typing_delay);
        let deadline = Instant::now() + self.form_stabilize_timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fill_once(page, delay).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    tracing::debug!("Login form on slot {} rerendered (fill {})", slot, attempt)
                }
                Err(e) => tracing::debug!("Filling login form on slot {} failed: {}", slot, e),
            }

            if Instant::now() >= deadline {
                return Err(SessionError::LoginTimeout {
                    slot,
                    waited: self.form_stabilize_timeout,
                });
            }
            tokio::time::sleep(FILL_RETRY_INTERVAL).await;
        }
    }

    async fn fill_once(&self, page: &mut dyn Page, delay: Duration) -> Result<bool, RuntimeError> {
        let fields = [
            (&self.login.username_selector, &self.login.username),
            (&self.login.password_selector, &self.login.password),
        ];
        for (selector, value) in fields {
            page.type_text(selector, value, delay).await?;
        }
        for (selector, value) in fields {
            if page.input_value(selector).await? != *value {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

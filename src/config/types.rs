use serde::Deserialize;

/// Main configuration structure for spa-mirror
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The site being mirrored
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Origin (and optional base path) of the application
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Additional manual crawl entrypoints (absolute URLs on the same origin)
    #[serde(default)]
    pub entrypoints: Vec<String>,

    /// Path prefixes treated as API endpoints (never crawled or mirrored)
    #[serde(rename = "api-path-prefixes", default = "default_api_path_prefixes")]
    pub api_path_prefixes: Vec<String>,
}

/// Login flow configuration
#[derive(Clone, Deserialize)]
pub struct LoginConfig {
    /// Whether pages require an authenticated session
    #[serde(default)]
    pub required: bool,

    /// Route of the login form (also the route that signals an expired session)
    #[serde(default = "default_login_path")]
    pub path: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// CSS selector of the username input
    #[serde(rename = "username-selector", default = "default_username_selector")]
    pub username_selector: String,

    /// CSS selector of the password input
    #[serde(rename = "password-selector", default = "default_password_selector")]
    pub password_selector: String,

    /// Delay between typed characters (milliseconds)
    #[serde(rename = "typing-delay", default = "default_typing_delay")]
    pub typing_delay: u64,
}

impl std::fmt::Debug for LoginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginConfig")
            .field("required", &self.required)
            .field("path", &self.path)
            .field("username", &mask(&self.username))
            .field("password", &mask(&self.password))
            .field("username_selector", &self.username_selector)
            .field("password_selector", &self.password_selector)
            .field("typing_delay", &self.typing_delay)
            .finish()
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            required: false,
            path: default_login_path(),
            username: String::new(),
            password: String::new(),
            username_selector: default_username_selector(),
            password_selector: default_password_selector(),
            typing_delay: default_typing_delay(),
        }
    }
}

/// Session pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Number of browser contexts (max concurrent authenticated page visits)
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: u32,

    /// How long to wait for the post-login redirect (milliseconds)
    #[serde(rename = "login-wait-timeout", default = "default_login_wait_timeout")]
    pub login_wait_timeout: u64,

    /// How long to keep refilling a rerendering login form (milliseconds)
    #[serde(rename = "form-stabilize-timeout", default = "default_form_stabilize_timeout")]
    pub form_stabilize_timeout: u64,

    /// Pause after the login page loads, for hydration to settle (milliseconds)
    #[serde(rename = "rerender-timeout", default = "default_rerender_timeout")]
    pub rerender_timeout: u64,

    /// Login attempts per slot before the slot is closed
    #[serde(rename = "login-attempts", default = "default_login_attempts")]
    pub login_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            login_wait_timeout: default_login_wait_timeout(),
            form_stabilize_timeout: default_form_stabilize_timeout(),
            rerender_timeout: default_rerender_timeout(),
            login_attempts: default_login_attempts(),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent page visits
    #[serde(rename = "max-concurrent-pages", default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: u32,

    /// Navigation timeout (milliseconds)
    #[serde(rename = "navigation-timeout", default = "default_navigation_timeout")]
    pub navigation_timeout: u64,

    /// Best-effort wait for network idle after navigation (milliseconds)
    #[serde(rename = "network-idle-timeout", default = "default_network_idle_timeout")]
    pub network_idle_timeout: u64,

    /// Stop enqueuing once this many targets were seen (0 = unlimited)
    #[serde(rename = "max-targets", default)]
    pub max_targets: u32,

    /// Glob patterns a page URL must match (default: everything under base-url)
    #[serde(rename = "include-globs", default)]
    pub include_globs: Vec<String>,

    /// Regular expressions a page URL must match
    #[serde(rename = "include-regexes", default)]
    pub include_regexes: Vec<String>,

    /// Glob patterns excluding page URLs
    #[serde(rename = "exclude-globs", default)]
    pub exclude_globs: Vec<String>,

    /// Regular expressions excluding page URLs
    #[serde(rename = "exclude-regexes", default)]
    pub exclude_regexes: Vec<String>,

    /// Attempts per file write before the target is dropped
    #[serde(rename = "write-attempts", default = "default_write_attempts")]
    pub write_attempts: u32,

    /// User agent sent by the HTTP runtime
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pages: default_max_concurrent_pages(),
            navigation_timeout: default_navigation_timeout(),
            network_idle_timeout: default_network_idle_timeout(),
            max_targets: 0,
            include_globs: Vec::new(),
            include_regexes: Vec::new(),
            exclude_globs: Vec::new(),
            exclude_regexes: Vec::new(),
            write_attempts: default_write_attempts(),
            user_agent: default_user_agent(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root of the mirror tree
    #[serde(rename = "out-dir", default = "default_out_dir")]
    pub out_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
        }
    }
}

impl Config {
    /// Renders the configuration for display with credentials masked
    pub fn redacted_summary(&self) -> String {
        let mut lines = vec![
            format!("base-url: {}", self.site.base_url),
            format!("entrypoints: {:?}", self.site.entrypoints),
            format!("api-path-prefixes: {:?}", self.site.api_path_prefixes),
            format!("login.required: {}", self.login.required),
        ];
        if self.login.required {
            lines.push(format!("login.path: {}", self.login.path));
            lines.push(format!("login.username: {}", mask(&self.login.username)));
            lines.push(format!("login.password: {}", mask(&self.login.password)));
        }
        lines.push(format!("session.pool-size: {}", self.session.pool_size));
        lines.push(format!(
            "crawler.max-concurrent-pages: {}",
            self.crawler.max_concurrent_pages
        ));
        lines.push(format!("crawler.include-globs: {:?}", self.crawler.include_globs));
        lines.push(format!(
            "crawler.include-regexes: {:?}",
            self.crawler.include_regexes
        ));
        lines.push(format!("crawler.exclude-globs: {:?}", self.crawler.exclude_globs));
        lines.push(format!(
            "crawler.exclude-regexes: {:?}",
            self.crawler.exclude_regexes
        ));
        lines.push(format!("output.out-dir: {}", self.output.out_dir));
        lines.join("\n")
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

fn default_api_path_prefixes() -> Vec<String> {
    vec!["/api".to_string()]
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_username_selector() -> String {
    "input[name='login']:visible".to_string()
}

fn default_password_selector() -> String {
    "input[name='password']:visible".to_string()
}

fn default_typing_delay() -> u64 {
    50
}

fn default_pool_size() -> u32 {
    1
}

fn default_login_wait_timeout() -> u64 {
    60_000
}

fn default_form_stabilize_timeout() -> u64 {
    10_000
}

fn default_rerender_timeout() -> u64 {
    1_200
}

fn default_login_attempts() -> u32 {
    3
}

fn default_max_concurrent_pages() -> u32 {
    10
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_network_idle_timeout() -> u64 {
    20_000
}

fn default_write_attempts() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!("spa-mirror/{}", env!("CARGO_PKG_VERSION"))
}

fn default_out_dir() -> String {
    "out".to_string()
}

use crate::config::types::{Config, CrawlerConfig, LoginConfig, SessionConfig, SiteConfig};
use crate::url::LinkPattern;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let base = validate_site_config(&config.site)?;
    validate_login_config(&config.login)?;
    validate_session_config(&config.session)?;
    validate_crawler_config(&config.crawler)?;
    validate_entrypoints(&config.site.entrypoints, &base)?;

    if config.output.out_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "out-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site section and returns the parsed base URL
fn validate_site_config(config: &SiteConfig) -> Result<Url, ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            base.scheme()
        )));
    }

    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    for prefix in &config.api_path_prefixes {
        if !prefix.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "api-path-prefixes entries must start with '/', got '{}'",
                prefix
            )));
        }
    }

    Ok(base)
}

/// Validates login configuration
fn validate_login_config(config: &LoginConfig) -> Result<(), ConfigError> {
    if !config.required {
        return Ok(());
    }

    if !config.path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "login path must start with '/', got '{}'",
            config.path
        )));
    }

    // Every URL would look like a login redirect
    if config.path.trim_end_matches('/').is_empty() {
        return Err(ConfigError::Validation(
            "login path '/' is not supported".to_string(),
        ));
    }

    if config.username.is_empty() || config.password.is_empty() {
        return Err(ConfigError::Validation(
            "login is required but username or password is empty".to_string(),
        ));
    }

    if config.username_selector.trim().is_empty() || config.password_selector.trim().is_empty()
    {
        return Err(ConfigError::Validation(
            "login input selectors cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates session pool configuration
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 64 {
        return Err(ConfigError::Validation(format!(
            "pool-size must be between 1 and 64, got {}",
            config.pool_size
        )));
    }

    if config.login_attempts < 1 {
        return Err(ConfigError::Validation(
            "login-attempts must be >= 1".to_string(),
        ));
    }

    if config.login_wait_timeout == 0 || config.form_stabilize_timeout == 0 {
        return Err(ConfigError::Validation(
            "login timeouts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-pages must be between 1 and 256, got {}",
            config.max_concurrent_pages
        )));
    }

    if config.navigation_timeout == 0 {
        return Err(ConfigError::Validation(
            "navigation-timeout must be greater than zero".to_string(),
        ));
    }

    if config.write_attempts < 1 {
        return Err(ConfigError::Validation(
            "write-attempts must be >= 1".to_string(),
        ));
    }

    for glob in config.include_globs.iter().chain(&config.exclude_globs) {
        LinkPattern::glob(glob)?;
    }
    for regex in config.include_regexes.iter().chain(&config.exclude_regexes) {
        LinkPattern::regex(regex)?;
    }

    Ok(())
}

/// Entrypoints must be absolute URLs on the mirrored origin
fn validate_entrypoints(entrypoints: &[String], base: &Url) -> Result<(), ConfigError> {
    for entry in entrypoints {
        let url = Url::parse(entry).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid entrypoint '{}': {}", entry, e))
        })?;

        if url.origin() != base.origin() {
            return Err(ConfigError::Validation(format!(
                "Entrypoint '{}' is not on the origin of base-url",
                entry
            )));
        }
    }
    Ok(())
}

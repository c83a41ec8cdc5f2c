use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `login.username`
pub const LOGIN_ENV_VAR: &str = "SPA_MIRROR_LOGIN";

/// Environment variable overriding `login.password`
pub const PASSWORD_ENV_VAR: &str = "SPA_MIRROR_PASSWORD";

/// Loads and parses a configuration file from the given path
///
/// Credentials from [`LOGIN_ENV_VAR`] / [`PASSWORD_ENV_VAR`] take precedence
/// over the file so that secrets can stay out of it.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Parses TOML text into a [`Config`] without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Replaces credentials with values from the environment lookup, when set
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(username) = lookup(LOGIN_ENV_VAR).filter(|v| !v.is_empty()) {
        config.login.username = username;
    }
    if let Some(password) = lookup(PASSWORD_ENV_VAR).filter(|v| !v.is_empty()) {
        config.login.password = password;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

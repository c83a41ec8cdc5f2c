//! spa-mirror: a static mirror builder for client-rendered websites
//!
//! This crate renders the pages of a single-page application through a browser
//! runtime, discovers the reachable URL set from the rendered DOM and the
//! hydration state, and writes pages and assets into a deterministic file tree
//! that a plain static web server can serve.

pub mod config;
pub mod crawler;
pub mod discovery;
pub mod dom;
pub mod mirror;
pub mod output;
pub mod overlay;
pub mod runtime;
pub mod session;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for spa-mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Browser runtime error: {0}")]
    Runtime(#[from] runtime::RuntimeError),

    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    #[error("Refusing unsafe mirror path for {target}: {reason}")]
    UnsafePath { target: String, reason: String },

    #[error("Failed to write {} after {attempts} attempt(s): {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        attempts: u32,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MirrorError {
    /// Builds an [`MirrorError::UnsafePath`] for a target
    pub fn unsafe_path(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafePath {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that must stop the whole crawl
    ///
    /// Only authentication failures are fatal; everything else is contained
    /// to the page visit that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_fatal())
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid link pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("URL exceeds {max} characters")]
    TooLong { max: usize },

    #[error("URL is outside the mirrored origin: {0}")]
    CrossOrigin(String),

    #[error("Not a crawl candidate: {0}")]
    NotCandidate(String),

    #[error("API endpoint, not mirrored: {0}")]
    ApiPath(String),
}

/// Result type alias for spa-mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, Coordinator, CrawlTarget, TargetKind};
pub use mirror::{MirrorPath, MirrorWriter, PathResolver};
pub use session::{SessionLease, SessionPool};

//! Session management for spa-mirror
//!
//! This module owns the authenticated browser contexts:
//! - `state` defines the per-slot lifecycle
//! - `login` drives the login form of the target site
//! - `pool` lends authenticated contexts to page visits

mod login;
mod pool;
mod state;

#[cfg(test)]
pub(crate) mod fake;

pub use login::Authenticator;
pub use pool::{SessionHandle, SessionLease, SessionPool};
pub use state::SessionState;

use crate::runtime::RuntimeError;
use std::time::Duration;
use thiserror::Error;

/// Session-specific errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Login on slot {slot} did not complete within {waited:?}")]
    LoginTimeout { slot: usize, waited: Duration },

    #[error("Session on slot {slot} was sent back to the login page")]
    SessionInvalidated { slot: usize },

    #[error("Authentication failed on slot {slot} after {attempts} attempt(s)")]
    AuthenticationFailed { slot: usize, attempts: u32 },

    #[error("Session pool is closed: no authenticated session remains")]
    PoolClosed,

    #[error("Browser runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl SessionError {
    /// Returns true if no page visit can proceed after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. } | Self::PoolClosed)
    }
}

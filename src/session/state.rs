/// Session slot state definitions
///
/// Every pool slot moves through these states over the lifetime of a crawl.
use std::fmt;

/// Represents the current state of one session pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    // ===== Startup =====
    /// Context created, no login attempted yet
    Fresh,

    /// Login flow in progress
    LoggingIn,

    // ===== In Rotation =====
    /// Logged in; the handle can be lent to page visits
    Authenticated,

    // ===== Out of Rotation =====
    /// A visit was bounced to the login route; waiting for re-login
    Invalidated,

    /// Terminal: shut down, or the login retry budget is exhausted
    Closed,
}

impl SessionState {
    /// Returns true if a handle in this state may be lent out
    pub fn is_lendable(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Fresh, LoggingIn)
                | (Fresh, Authenticated)
                | (LoggingIn, Authenticated)
                | (Authenticated, Invalidated)
                | (Invalidated, LoggingIn)
                | (Fresh | LoggingIn | Authenticated | Invalidated, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::LoggingIn => "logging_in",
            Self::Authenticated => "authenticated",
            Self::Invalidated => "invalidated",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

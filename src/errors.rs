//! Scriptgate error types.

use std::fmt;
use thiserror::Error;

/// Why a request was refused.
///
/// Carried inside [`GateError::Forbidden`] for diagnostics and tests only.
/// The error's `Display` never includes it, so callers of the HTTP surface
/// cannot tell one reason from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Ticket access token does not match the stored resource token.
    TokenMismatch,
    /// Ticket timestamp is not a decimal Unix-seconds value.
    MalformedTimestamp,
    /// Ticket timestamp is outside the TTL window.
    Expired,
    /// Ticket signature does not match.
    BadSignature,
    /// Declared client identity failed classification.
    ClientRejected,
    /// Redemption key (or resource) is unknown.
    UnknownKey,
    /// Unlock callback arrived without a completion token.
    MissingCompletion,
    /// Monetization gateway refused the completion token.
    CompletionRejected,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::TokenMismatch => "token mismatch",
            Rejection::MalformedTimestamp => "malformed timestamp",
            Rejection::Expired => "ticket outside ttl window",
            Rejection::BadSignature => "bad signature",
            Rejection::ClientRejected => "client rejected",
            Rejection::UnknownKey => "unknown key",
            Rejection::MissingCompletion => "missing completion token",
            Rejection::CompletionRejected => "completion rejected",
        };
        f.write_str(reason)
    }
}

/// Errors that can occur while gating a resource.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration is invalid or incomplete.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unknown resource id.
    #[error("Not found")]
    NotFound,

    /// Request refused. The reason is deliberately left out of the message.
    #[error("Forbidden")]
    Forbidden(Rejection),

    /// Too many key issuances from one client address.
    #[error("Rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_secs: u64,
    },

    /// Monetization gateway failed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Uploaded payload was empty or too large.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Resource or key store I/O error.
    #[error("Store I/O error: {0}")]
    StoreIO(String),

    /// Failed to parse an upstream response.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Worker task failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// The rejection reason, if this is a `Forbidden` error.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            GateError::Forbidden(reason) => Some(*reason),
            _ => None,
        }
    }
}

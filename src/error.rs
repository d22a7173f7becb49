//! Typed security outcomes.
//!
//! Every expected denial path in the engine is a variant here, so callers can
//! render a uniform user-facing message without inspecting internals.
//! Unexpected failures (crypto backend, backing store) are carried as
//! `Internal` and must be treated as a denial by the caller (fail closed).

use thiserror::Error;

use crate::password::PolicyViolation;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Account is temporarily locked")]
    AccountLocked { retry_after_seconds: i64 },

    #[error("Too many requests")]
    RateLimited,

    #[error("Request blocked due to suspicious activity")]
    SuspiciousActivity,

    #[error("Two-factor code required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    TwoFactorInvalid,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session no longer valid for this client")]
    SessionMismatch,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Invalid token")]
    TokenMalformed,

    #[error("Password does not meet policy requirements")]
    PasswordPolicyViolation(Vec<PolicyViolation>),

    #[error("Request blocked")]
    ThreatDetected,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SecurityError {
    /// Whether the error is an expected policy denial rather than an
    /// internal failure.
    pub fn is_denial(&self) -> bool {
        !matches!(self, SecurityError::Internal(_))
    }
}

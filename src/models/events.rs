//! Security event and failed-attempt records.
//!
//! Both are append-only and pruned by a rolling time window; neither is ever
//! mutated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Security event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// SQL-style injection pattern in input
    InjectionAttempt,
    /// Script/markup injection pattern in input
    ScriptInjection,
    /// Control characters or prompt-injection markers in input
    ControlCharacterInjection,
    /// Repeated failed logins
    BruteForceAttempt,
    /// Invalid, expired, or revoked token used
    InvalidTokenUsage,
    /// Account transitioned to locked
    AccountLockout,
    /// Admission denied by the rate limiter
    RateLimitExceeded,
    /// Catch-all for anomalous request patterns
    SuspiciousActivity,
}

/// Event severity, ordered so thresholds can be compared with `>=`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

/// A single security audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub ip_address: String,
    pub user_id: Option<String>,
    /// Whether the triggering request was blocked.
    pub blocked: bool,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        severity: Severity,
        ip_address: impl Into<String>,
        user_id: Option<String>,
        blocked: bool,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            severity,
            ip_address: ip_address.into(),
            user_id,
            blocked,
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

/// A failed authentication attempt for an identity from an ip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub identity: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl FailedAttempt {
    pub fn new(identity: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ip_address: ip_address.into(),
            created_at: Utc::now(),
        }
    }
}

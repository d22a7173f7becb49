//! Session record and its lifecycle states.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle state.
///
/// Transitions only move forward from `Active`; the other three states are
/// absorbing. [`SessionRecord::transition`] enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Suspended,
    Terminated,
}

/// Security-relevant flags attached to a session at creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionFlags {
    pub remember_me: bool,
    pub verified_device: bool,
}

/// Session entity. Owned exclusively by the session store; mutated only
/// through the session manager's operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub device_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub location: Option<String>,
    pub flags: SessionFlags,
}

impl SessionRecord {
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
        ttl_minutes: i64,
        flags: SessionFlags,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::minutes(ttl_minutes),
            status: SessionStatus::Active,
            location: None,
            flags,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && !self.is_expired()
    }

    /// Apply a forward-only status transition.
    ///
    /// Returns false (and leaves the record untouched) if the session is not
    /// `Active` or the target is `Active`.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if self.status != SessionStatus::Active || next == SessionStatus::Active {
            return false;
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new(
            "user_1",
            "device_1",
            "10.0.0.1",
            "test-agent",
            30,
            SessionFlags::default(),
        )
    }

    #[test]
    fn test_new_session_is_active_with_future_expiry() {
        let session = record();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.expires_at > session.created_at);
        assert!(session.is_active());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        let mut session = record();
        assert!(session.transition(SessionStatus::Suspended));
        assert_eq!(session.status, SessionStatus::Suspended);

        // Absorbing: no way back to Active, and no lateral moves either.
        assert!(!session.transition(SessionStatus::Active));
        assert!(!session.transition(SessionStatus::Terminated));
        assert_eq!(session.status, SessionStatus::Suspended);
    }

    #[test]
    fn test_active_to_active_is_rejected() {
        let mut session = record();
        assert!(!session.transition(SessionStatus::Active));
        assert_eq!(session.status, SessionStatus::Active);
    }
}

//! Security context - the validated identity/permission bundle produced by a
//! successful authentication or token validation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of permission kinds.
///
/// Membership checks are O(1) against a `HashSet<Permission>`; no runtime
/// string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Moderate,
    ManageSessions,
    Admin,
}

/// Ordered security level attached to an identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Standard,
    Elevated,
    Critical,
}

/// Immutable once constructed; rebuilt on each successful validation rather
/// than mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: String,
    pub session_id: String,
    pub permissions: HashSet<Permission>,
    pub security_level: SecurityLevel,
    pub client_ip: String,
    pub user_agent: String,
    pub issued_at: DateTime<Utc>,
}

impl SecurityContext {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_levels_are_ordered() {
        assert!(SecurityLevel::Low < SecurityLevel::Standard);
        assert!(SecurityLevel::Standard < SecurityLevel::Elevated);
        assert!(SecurityLevel::Elevated < SecurityLevel::Critical);
    }

    #[test]
    fn test_permission_membership() {
        let ctx = SecurityContext {
            user_id: "user_1".to_string(),
            session_id: "session_1".to_string(),
            permissions: [Permission::Read, Permission::Write].into_iter().collect(),
            security_level: SecurityLevel::Standard,
            client_ip: "10.0.0.1".to_string(),
            user_agent: "test-agent".to_string(),
            issued_at: Utc::now(),
        };

        assert!(ctx.has_permission(Permission::Read));
        assert!(!ctx.has_permission(Permission::Admin));
    }
}

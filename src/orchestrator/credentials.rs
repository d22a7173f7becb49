//! Credential lookup boundary.
//!
//! The engine never owns user records; the route layer's persistence (mocked
//! or real) implements this trait. The in-memory store doubles as the test
//! double and the single-instance reference.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::crypto::PasswordHashString;
use crate::models::{Permission, SecurityLevel};

/// Everything the engine needs to know about an identity.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub user_id: String,
    pub identity: String,
    pub password_hash: PasswordHashString,
    pub permissions: HashSet<Permission>,
    pub security_level: SecurityLevel,
    pub two_factor_enabled: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_identity(&self, identity: &str)
        -> Result<Option<IdentityRecord>, anyhow::Error>;

    /// Verify a two-factor code for a user. Only called when the identity
    /// has two-factor enabled.
    async fn verify_two_factor(&self, user_id: &str, code: &str)
        -> Result<bool, anyhow::Error>;
}

/// In-memory credential store for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    identities: DashMap<String, IdentityRecord>,
    two_factor_codes: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
            two_factor_codes: DashMap::new(),
        }
    }

    pub fn add_identity(&self, record: IdentityRecord) {
        self.identities.insert(record.identity.clone(), record);
    }

    /// Set the code the next two-factor verification for `user_id` must
    /// present.
    pub fn set_two_factor_code(&self, user_id: &str, code: &str) {
        self.two_factor_codes
            .insert(user_id.to_string(), code.to_string());
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_identity(
        &self,
        identity: &str,
    ) -> Result<Option<IdentityRecord>, anyhow::Error> {
        Ok(self.identities.get(identity).map(|r| r.clone()))
    }

    async fn verify_two_factor(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<bool, anyhow::Error> {
        let expected = self.two_factor_codes.get(user_id);
        Ok(expected.is_some_and(|expected| {
            expected.as_bytes().ct_eq(code.as_bytes()).into()
        }))
    }
}

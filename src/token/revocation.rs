//! Revocation-set backends.
//!
//! A revoked jti stays rejected for the remainder of the token's natural
//! lifetime; entries expire once the token itself would have. Revocation
//! must be visible to every validation that starts after the revoke call
//! returns, which the shared in-memory set and a single Redis give for free.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark a jti revoked for `ttl_seconds`. Idempotent.
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error>;
}

/// Mutex-guarded in-memory revocation set; single-instance and test use.
#[derive(Default)]
pub struct MemoryRevocationStore {
    revoked: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self {
            revoked: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut revoked = self
            .revoked
            .lock()
            .map_err(|e| anyhow::anyhow!("Revocation set mutex poisoned: {}", e))?;
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds.max(1));
        // Entries for already-dead tokens are dropped while we hold the lock.
        revoked.retain(|_, expiry| *expiry > Utc::now());
        revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let revoked = self
            .revoked
            .lock()
            .map_err(|e| anyhow::anyhow!("Revocation set mutex poisoned: {}", e))?;
        Ok(revoked
            .get(jti)
            .is_some_and(|expiry| *expiry > Utc::now()))
    }
}

/// Redis-backed revocation set for multi-instance deployments.
#[derive(Clone)]
pub struct RedisRevocationStore {
    manager: ConnectionManager,
}

impl RedisRevocationStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting revocation store to Redis");
        let client = redis::Client::open(url)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
        Ok(Self { manager })
    }

    fn key(jti: &str) -> String {
        format!("revoked:{}", jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::key(jti))
            .arg("revoked")
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to revoke token: {}", e))
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revocation: {}", e))?;
        Ok(exists)
    }
}

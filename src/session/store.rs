use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

use crate::models::SessionRecord;

/// Narrow storage capability set for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> Result<(), anyhow::Error>;
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, anyhow::Error>;
    /// Replace an existing record; returns false if it does not exist.
    async fn update(&self, record: SessionRecord) -> Result<bool, anyhow::Error>;
    async fn remove(&self, session_id: &str) -> Result<bool, anyhow::Error>;
    async fn scan_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, anyhow::Error>;
    /// Delete records whose expiry is before `cutoff`. Returns the number
    /// removed.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, anyhow::Error>;
}

/// Mutex-guarded in-memory map; single-instance and test use only.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionRecord>>, anyhow::Error> {
        self.sessions
            .lock()
            .map_err(|e| anyhow::anyhow!("Session store mutex poisoned: {}", e))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), anyhow::Error> {
        self.lock()?.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, anyhow::Error> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    async fn update(&self, record: SessionRecord) -> Result<bool, anyhow::Error> {
        let mut sessions = self.lock()?;
        if sessions.contains_key(&record.session_id) {
            sessions.insert(record.session_id.clone(), record);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn remove(&self, session_id: &str) -> Result<bool, anyhow::Error> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    async fn scan_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, anyhow::Error> {
        Ok(self
            .lock()?
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, anyhow::Error> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= cutoff);
        Ok(before - sessions.len())
    }
}

/// Redis-backed session store for multi-instance deployments.
///
/// Records are stored as JSON under `session:{id}` with a per-user index
/// set under `user_sessions:{user}`. Key TTLs are left to the sweep rather
/// than Redis expiry so absorbing-state records stay visible until swept.
#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting session store to Redis");
        let client = redis::Client::open(url)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
        Ok(Self { manager })
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{}", session_id)
    }

    fn user_key(user_id: &str) -> String {
        format!("user_sessions:{}", user_id)
    }

    async fn write(&self, record: &SessionRecord) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(record)?;
        redis::cmd("SET")
            .arg(Self::session_key(&record.session_id))
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write session: {}", e))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), anyhow::Error> {
        self.write(&record).await?;
        let mut conn = self.manager.clone();
        redis::cmd("SADD")
            .arg(Self::user_key(&record.user_id))
            .arg(&record.session_id)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to index session: {}", e))
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = redis::cmd("GET")
            .arg(Self::session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read session: {}", e))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(Into::into))
            .transpose()
    }

    async fn update(&self, record: SessionRecord) -> Result<bool, anyhow::Error> {
        if self.get(&record.session_id).await?.is_none() {
            return Ok(false);
        }
        self.write(&record).await?;
        Ok(true)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, anyhow::Error> {
        let record = self.get(session_id).await?;
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(Self::session_key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete session: {}", e))?;
        if let Some(record) = record {
            redis::cmd("SREM")
                .arg(Self::user_key(&record.user_id))
                .arg(session_id)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to unindex session: {}", e))?;
        }
        Ok(removed > 0)
    }

    async fn scan_by_user(&self, user_id: &str) -> Result<Vec<SessionRecord>, anyhow::Error> {
        let mut conn = self.manager.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(Self::user_key(user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to scan sessions: {}", e))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, anyhow::Error> {
        let mut conn = self.manager.clone();
        let mut removed = 0;
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("session:*")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to scan session keys: {}", e))?;

            for key in keys {
                let session_id = key.trim_start_matches("session:").to_string();
                if let Some(record) = self.get(&session_id).await? {
                    if record.expires_at < cutoff && self.remove(&session_id).await? {
                        removed += 1;
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(removed)
    }
}

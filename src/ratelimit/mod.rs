//! Sliding-window admission control keyed by arbitrary strings.
//!
//! Both implementations satisfy the same contract: prune timestamps older
//! than the window, admit iff the remaining count is below the limit, and
//! record the new timestamp only on admission. The in-memory limiter is
//! scoped to tests and single-instance deployments; multi-instance
//! deployments plug in the Redis-backed counter.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use uuid::Uuid;

/// Sliding-window rate limit contract.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Admit or reject one event for `key`. At most `limit` events are
    /// admitted within any window of `window_seconds` ending at now.
    async fn is_allowed(&self, key: &str, limit: u32, window_seconds: u64) -> bool;
}

/// In-memory sliding-window counter: one timestamp deque per key.
///
/// Critical sections are O(window) deque operations with no I/O; dashmap
/// shards the per-key locks.
#[derive(Default)]
pub struct MemoryRateLimiter {
    windows: DashMap<String, VecDeque<chrono::DateTime<Utc>>>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn is_allowed(&self, key: &str, limit: u32, window_seconds: u64) -> bool {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(window_seconds as i64);

        let mut timestamps = self.windows.entry(key.to_string()).or_default();
        while timestamps.front().is_some_and(|t| *t < cutoff) {
            timestamps.pop_front();
        }

        if timestamps.len() < limit as usize {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Redis-backed sliding window over a sorted set per key.
///
/// On backend failure the limiter fails open so a counter outage cannot
/// block all traffic; the degraded mode is logged.
#[derive(Clone)]
pub struct RedisRateLimiter {
    manager: ConnectionManager,
}

impl RedisRateLimiter {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting rate limiter to Redis");
        let client = redis::Client::open(url)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
        Ok(Self { manager })
    }

    async fn check(&self, key: &str, limit: u32, window_seconds: u64) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("ratelimit:{}", key);
        let now_ms = Utc::now().timestamp_millis();
        let cutoff_ms = now_ms - (window_seconds as i64) * 1000;

        redis::cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg(0)
            .arg(cutoff_ms)
            .query_async::<_, ()>(&mut conn)
            .await?;

        let count: u64 = redis::cmd("ZCARD").arg(&key).query_async(&mut conn).await?;
        if count >= limit as u64 {
            return Ok(false);
        }

        // Member must be unique so concurrent admissions in the same
        // millisecond are all counted.
        let member = format!("{}:{}", now_ms, Uuid::new_v4());
        redis::cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(member)
            .query_async::<_, ()>(&mut conn)
            .await?;
        redis::cmd("PEXPIRE")
            .arg(&key)
            .arg((window_seconds as i64) * 1000)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn is_allowed(&self, key: &str, limit: u32, window_seconds: u64) -> bool {
        match self.check(key, limit, window_seconds).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    "Rate limit backend unreachable; failing open"
                );
                true
            }
        }
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::SessionConfig;
use crate::crypto::CryptoManager;
use crate::error::SecurityError;
use crate::models::{SessionFlags, SessionRecord, SessionStatus};
use crate::session::SessionStore;

/// Session lifecycle policy over a pluggable store.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    crypto: CryptoManager,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, crypto: CryptoManager, config: SessionConfig) -> Self {
        Self {
            store,
            crypto,
            config,
        }
    }

    /// Create a session, evicting the least-recently-active Active session
    /// first if the per-user cap would be exceeded.
    pub async fn create(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
        remember_me: bool,
        ttl_hint_minutes: Option<i64>,
    ) -> Result<SessionRecord, SecurityError> {
        self.enforce_session_cap(user_id).await?;

        let requested = ttl_hint_minutes.unwrap_or(if remember_me {
            self.config.remember_me_days * 24 * 60
        } else {
            self.config.default_timeout_minutes
        });
        let cap = if remember_me {
            self.config.remember_me_days * 24 * 60
        } else {
            self.config.max_timeout_minutes
        };
        let ttl_minutes = requested.clamp(1, cap);

        let record = SessionRecord::new(
            user_id,
            self.crypto.fingerprint(user_agent),
            ip_address,
            user_agent,
            ttl_minutes,
            SessionFlags {
                remember_me,
                verified_device: false,
            },
        );

        self.store.insert(record.clone()).await?;
        tracing::info!(
            user_id = %user_id,
            session_id = %record.session_id,
            remember_me = remember_me,
            "Session created"
        );
        Ok(record)
    }

    /// Validate a session against expiry and client ip.
    ///
    /// Expiry marks the record Expired; an ip change (when sharing is
    /// disallowed) marks it Suspended. Both transitions are permanent.
    /// Successful validation bumps `last_activity` but never extends
    /// `expires_at`; that is [`refresh`]'s job.
    ///
    /// [`refresh`]: SessionManager::refresh
    pub async fn validate(
        &self,
        session_id: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<SessionRecord, SecurityError> {
        let mut record = self
            .store
            .get(session_id)
            .await?
            .ok_or(SecurityError::SessionExpired)?;

        if record.status != SessionStatus::Active {
            return Err(SecurityError::SessionExpired);
        }

        if record.is_expired() {
            record.transition(SessionStatus::Expired);
            self.store.update(record).await?;
            return Err(SecurityError::SessionExpired);
        }

        if !self.config.allow_ip_change && record.ip_address != ip_address {
            tracing::warn!(
                session_id = %session_id,
                expected_ip = %record.ip_address,
                actual_ip = %ip_address,
                "Session ip mismatch; suspending"
            );
            record.transition(SessionStatus::Suspended);
            self.store.update(record).await?;
            return Err(SecurityError::SessionMismatch);
        }

        if let Some(agent) = user_agent {
            if record.user_agent != agent {
                tracing::warn!(
                    session_id = %session_id,
                    "Session user-agent mismatch; suspending"
                );
                record.transition(SessionStatus::Suspended);
                self.store.update(record).await?;
                return Err(SecurityError::SessionMismatch);
            }
        }

        record.last_activity = Utc::now();
        self.store.update(record.clone()).await?;
        Ok(record)
    }

    /// Extend an Active session's expiry. Returns false if the session is
    /// missing, expired, or in an absorbing state.
    pub async fn refresh(
        &self,
        session_id: &str,
        extend_minutes: Option<i64>,
    ) -> Result<bool, SecurityError> {
        let Some(mut record) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        if !record.is_active() {
            return Ok(false);
        }

        let minutes = extend_minutes
            .unwrap_or(self.config.default_timeout_minutes)
            .clamp(1, self.config.max_timeout_minutes);
        record.expires_at = Utc::now() + Duration::minutes(minutes);
        record.last_activity = Utc::now();
        self.store.update(record).await?;
        Ok(true)
    }

    /// Terminate a session. Returns false if it was not Active.
    pub async fn terminate(&self, session_id: &str, reason: &str) -> Result<bool, SecurityError> {
        let Some(mut record) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        if !record.transition(SessionStatus::Terminated) {
            return Ok(false);
        }
        self.store.update(record).await?;
        tracing::info!(session_id = %session_id, reason = %reason, "Session terminated");
        Ok(true)
    }

    /// Terminate every Active session for a user, optionally sparing one.
    /// Returns the number terminated.
    pub async fn terminate_all(
        &self,
        user_id: &str,
        exclude_session_id: Option<&str>,
    ) -> Result<usize, SecurityError> {
        let mut count = 0;
        for record in self.store.scan_by_user(user_id).await? {
            if exclude_session_id == Some(record.session_id.as_str()) {
                continue;
            }
            if record.status == SessionStatus::Active
                && self.terminate(&record.session_id, "terminate_all").await?
            {
                count += 1;
            }
        }
        tracing::info!(user_id = %user_id, count = count, "Terminated user sessions");
        Ok(count)
    }

    /// Periodic maintenance: drop records whose expiry has passed. The only
    /// path that deletes session records.
    pub async fn sweep_expired(&self) -> Result<usize, SecurityError> {
        let removed = self.store.sweep_expired(Utc::now()).await?;
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    /// All sessions currently Active (and unexpired) for a user.
    pub async fn active_sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>, SecurityError> {
        Ok(self
            .store
            .scan_by_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.is_active())
            .collect())
    }

    async fn enforce_session_cap(&self, user_id: &str) -> Result<(), SecurityError> {
        let mut active = self.active_sessions(user_id).await?;
        while active.len() >= self.config.max_concurrent_sessions {
            // Least-recently-active goes first.
            active.sort_by_key(|s| s.last_activity);
            let victim = active.remove(0);
            tracing::info!(
                user_id = %user_id,
                session_id = %victim.session_id,
                "Session cap reached; evicting least-recently-active session"
            );
            self.terminate(&victim.session_id, "session_cap_eviction")
                .await?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

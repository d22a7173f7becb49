//! Top-level security facade.
//!
//! Composes the credential store, session manager, token issuer, rate
//! limiter, threat auditor, and password policy into the authentication and
//! validation state machines. This is the only component the route layer
//! talks to, and it is constructed explicitly at process start; there is no
//! global instance.

mod credentials;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

pub use credentials::{CredentialStore, IdentityRecord, MemoryCredentialStore};

use crate::audit::ThreatAuditor;
use crate::config::SecurityConfig;
use crate::crypto::{verify_password, CryptoManager, Password, PasswordHashString};
use crate::error::SecurityError;
use crate::models::{
    SecurityContext, SecurityEvent, SecurityEventType, SessionRecord, Severity,
};
use crate::password::{PasswordPolicyEngine, PasswordValidation, UserInfo};
use crate::ratelimit::{MemoryRateLimiter, RateLimitStore};
use crate::session::{MemorySessionStore, SessionManager, SessionStore};
use crate::token::{
    IssuedToken, MemoryRevocationStore, RevocationStore, TokenClaims, TokenIssuer, TokenKind,
};

/// Authentication request parameters.
#[derive(Debug)]
pub struct AuthRequest {
    pub identity: String,
    pub secret: Password,
    pub ip_address: String,
    pub user_agent: String,
    pub two_factor_code: Option<String>,
    pub remember_me: bool,
}

/// Successful authentication result.
#[derive(Debug)]
pub struct AuthGrant {
    pub context: SecurityContext,
    pub session_id: String,
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

/// Per-identity failed-attempt accumulator and lock state.
#[derive(Debug, Default)]
struct LockoutEntry {
    failures: Vec<DateTime<Utc>>,
    locked_at: Option<DateTime<Utc>>,
}

pub struct SecurityOrchestrator {
    config: SecurityConfig,
    credentials: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    tokens: TokenIssuer,
    limiter: Arc<dyn RateLimitStore>,
    auditor: Arc<ThreatAuditor>,
    passwords: PasswordPolicyEngine,
    lockouts: DashMap<String, LockoutEntry>,
}

impl SecurityOrchestrator {
    pub fn new(
        config: SecurityConfig,
        credentials: Arc<dyn CredentialStore>,
        session_store: Arc<dyn SessionStore>,
        revocations: Arc<dyn RevocationStore>,
        limiter: Arc<dyn RateLimitStore>,
    ) -> Result<Self, SecurityError> {
        config.validate()?;

        let crypto = CryptoManager::new(&config.token.secret);
        let sessions = SessionManager::new(session_store, crypto, config.session.clone());
        let tokens = TokenIssuer::new(config.token.clone(), revocations);
        let auditor = Arc::new(ThreatAuditor::new(config.audit.clone()));
        let passwords = PasswordPolicyEngine::new(config.password_policy.clone());

        tracing::info!(
            service = %config.service_name,
            "Security orchestrator initialized"
        );

        Ok(Self {
            config,
            credentials,
            sessions,
            tokens,
            limiter,
            auditor,
            passwords,
            lockouts: DashMap::new(),
        })
    }

    /// All-in-memory wiring for tests and single-instance deployments.
    pub fn in_memory(
        config: SecurityConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, SecurityError> {
        Self::new(
            config,
            credentials,
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryRevocationStore::new()),
            Arc::new(MemoryRateLimiter::new()),
        )
    }

    /// Run the full authentication state machine.
    ///
    /// Checks run in order: lockout, rate limit, suspicion, credential,
    /// two-factor; any failure short-circuits to a typed denial. A locked or
    /// suspicious caller is denied before any password comparison happens.
    pub async fn authenticate(&self, request: AuthRequest) -> Result<AuthGrant, SecurityError> {
        let identity = request.identity.as_str();
        let ip = request.ip_address.as_str();

        if !self.auditor.detect_threats(identity, ip, None).is_empty() {
            return Err(SecurityError::ThreatDetected);
        }

        if let Some(retry_after_seconds) = self.check_lockout(identity) {
            tracing::warn!(identity = %identity, "Attempt against locked account");
            return Err(SecurityError::AccountLocked {
                retry_after_seconds,
            });
        }

        let rate_key = format!("auth:{}", ip);
        let allowed = self
            .limiter
            .is_allowed(
                &rate_key,
                self.config.rate_limit.login_attempts,
                self.config.rate_limit.login_window_seconds,
            )
            .await;
        if !allowed {
            let _ = self.auditor.log_event_async(SecurityEvent::new(
                SecurityEventType::RateLimitExceeded,
                Severity::Warning,
                ip,
                None,
                true,
                format!("Login rate limit exceeded for {}", ip),
            ));
            return Err(SecurityError::RateLimited);
        }

        if self.auditor.is_suspicious(ip, Some(identity)) {
            self.auditor.log_event(SecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                Severity::High,
                ip,
                None,
                true,
                "Authentication denied before credential check".to_string(),
            ));
            return Err(SecurityError::SuspiciousActivity);
        }

        let Some(record) = self.credentials.find_identity(identity).await? else {
            self.record_failure(identity, ip);
            return Err(SecurityError::InvalidCredential);
        };

        if verify_password(&request.secret, &record.password_hash).is_err() {
            self.record_failure(identity, ip);
            return Err(SecurityError::InvalidCredential);
        }

        if record.two_factor_enabled {
            let Some(code) = request.two_factor_code.as_deref() else {
                return Err(SecurityError::TwoFactorRequired);
            };
            if !self.credentials.verify_two_factor(&record.user_id, code).await? {
                self.record_failure(identity, ip);
                return Err(SecurityError::TwoFactorInvalid);
            }
        }

        // Success clears the failed-attempt state for the identity.
        self.lockouts.remove(identity);

        let session = self
            .sessions
            .create(
                &record.user_id,
                ip,
                &request.user_agent,
                request.remember_me,
                None,
            )
            .await?;

        let access_token = self.tokens.issue_access(
            &record.user_id,
            &session.session_id,
            &record.permissions,
            record.security_level,
        )?;
        let refresh_token = self.tokens.issue_refresh(
            &record.user_id,
            &session.session_id,
            &record.permissions,
            record.security_level,
        )?;

        let context = SecurityContext {
            user_id: record.user_id.clone(),
            session_id: session.session_id.clone(),
            permissions: record.permissions,
            security_level: record.security_level,
            client_ip: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            issued_at: Utc::now(),
        };

        tracing::info!(
            user_id = %record.user_id,
            session_id = %session.session_id,
            "Authentication succeeded"
        );

        Ok(AuthGrant {
            context,
            session_id: session.session_id,
            access_token,
            refresh_token,
        })
    }

    /// Validate an access token and its bound session, rebuilding the
    /// security context.
    pub async fn validate(
        &self,
        token: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<SecurityContext, SecurityError> {
        let claims = match self.tokens.check(token, TokenKind::Access).await {
            Ok(claims) => claims,
            Err(e) => {
                self.auditor.log_event(SecurityEvent::new(
                    SecurityEventType::InvalidTokenUsage,
                    Severity::Warning,
                    ip_address,
                    None,
                    true,
                    format!("Token rejected: {}", e),
                ));
                return Err(e);
            }
        };

        let session = self
            .sessions
            .validate(&claims.sid, ip_address, user_agent)
            .await?;

        Ok(SecurityContext {
            user_id: claims.sub,
            session_id: session.session_id,
            permissions: claims.permissions,
            security_level: claims.lvl,
            client_ip: ip_address.to_string(),
            user_agent: session.user_agent,
            issued_at: Utc::now(),
        })
    }

    /// Issue a fresh access token for an already-validated context.
    pub fn issue_access_token(
        &self,
        context: &SecurityContext,
        session_id: &str,
    ) -> Result<IssuedToken, SecurityError> {
        self.tokens.issue_access(
            &context.user_id,
            session_id,
            &context.permissions,
            context.security_level,
        )
    }

    /// Issue a fresh refresh token for an already-validated context.
    pub fn issue_refresh_token(
        &self,
        context: &SecurityContext,
        session_id: &str,
    ) -> Result<IssuedToken, SecurityError> {
        self.tokens.issue_refresh(
            &context.user_id,
            session_id,
            &context.permissions,
            context.security_level,
        )
    }

    /// Oracle-safe token validation: pass/fail only.
    pub async fn validate_token(&self, token: &str, expected: TokenKind) -> Option<TokenClaims> {
        self.tokens.validate(token, expected).await
    }

    pub async fn revoke_token(&self, token: &str) -> Result<bool, SecurityError> {
        self.tokens.revoke(token).await
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
        remember_me: bool,
        ttl_hint_minutes: Option<i64>,
    ) -> Result<SessionRecord, SecurityError> {
        self.sessions
            .create(user_id, ip_address, user_agent, remember_me, ttl_hint_minutes)
            .await
    }

    pub async fn validate_session(
        &self,
        session_id: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> Result<SessionRecord, SecurityError> {
        self.sessions.validate(session_id, ip_address, user_agent).await
    }

    pub async fn refresh_session(
        &self,
        session_id: &str,
        extend_minutes: Option<i64>,
    ) -> Result<bool, SecurityError> {
        self.sessions.refresh(session_id, extend_minutes).await
    }

    pub async fn terminate_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<bool, SecurityError> {
        self.sessions.terminate(session_id, reason).await
    }

    pub async fn terminate_all_sessions(
        &self,
        user_id: &str,
        exclude_session_id: Option<&str>,
    ) -> Result<usize, SecurityError> {
        self.sessions.terminate_all(user_id, exclude_session_id).await
    }

    pub async fn is_allowed(&self, key: &str, limit: u32, window_seconds: u64) -> bool {
        self.limiter.is_allowed(key, limit, window_seconds).await
    }

    pub fn validate_password(
        &self,
        password: &str,
        user_info: Option<&UserInfo>,
        history: Option<&[PasswordHashString]>,
    ) -> PasswordValidation {
        self.passwords.validate(password, user_info, history)
    }

    pub fn detect_threats(
        &self,
        input: &str,
        ip_address: &str,
        user_id: Option<&str>,
    ) -> Vec<SecurityEvent> {
        self.auditor.detect_threats(input, ip_address, user_id)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn auditor(&self) -> &ThreatAuditor {
        &self.auditor
    }

    /// Remaining lockout seconds for an identity, or None if it may proceed.
    ///
    /// Lazy expiry: a lock past its duration is cleared here, on the next
    /// check, rather than by a background timer.
    fn check_lockout(&self, identity: &str) -> Option<i64> {
        let mut entry = self.lockouts.get_mut(identity)?;
        let locked_at = entry.locked_at?;
        let unlock_at = locked_at + Duration::seconds(self.config.lockout.lockout_duration_seconds);
        let now = Utc::now();

        if now < unlock_at {
            Some((unlock_at - now).num_seconds().max(1))
        } else {
            entry.locked_at = None;
            let cutoff = now - Duration::seconds(self.config.lockout.window_seconds);
            entry.failures.retain(|t| *t >= cutoff);
            None
        }
    }

    /// Record a failed attempt and lock the identity if it crosses the
    /// threshold within the rolling window.
    fn record_failure(&self, identity: &str, ip_address: &str) {
        self.auditor.record_failed_attempt(identity, ip_address);

        let now = Utc::now();
        let cutoff = now - Duration::seconds(self.config.lockout.window_seconds);

        let mut entry = self.lockouts.entry(identity.to_string()).or_default();
        entry.failures.retain(|t| *t >= cutoff);
        entry.failures.push(now);

        if entry.locked_at.is_none()
            && entry.failures.len() >= self.config.lockout.max_failed_attempts as usize
        {
            entry.locked_at = Some(now);
            self.auditor.log_event(SecurityEvent::new(
                SecurityEventType::AccountLockout,
                Severity::High,
                ip_address,
                None,
                true,
                format!("Account locked after repeated failures: {}", identity),
            ));
            tracing::warn!(identity = %identity, "Account locked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_config, LockoutConfig};
    use crate::crypto::hash_password;
    use crate::models::Permission;
    use std::collections::HashSet;

    const GOOD_PASSWORD: &str = "C0rrect-h0rse-b@ttery";

    fn permissions() -> HashSet<Permission> {
        [Permission::Read, Permission::Write].into_iter().collect()
    }

    fn store_with_alice(two_factor: bool) -> Arc<MemoryCredentialStore> {
        let store = Arc::new(MemoryCredentialStore::new());
        let hash = hash_password(&Password::new(GOOD_PASSWORD.to_string())).unwrap();
        store.add_identity(IdentityRecord {
            user_id: "user_alice".to_string(),
            identity: "alice".to_string(),
            password_hash: hash,
            permissions: permissions(),
            security_level: crate::models::SecurityLevel::Standard,
            two_factor_enabled: two_factor,
        });
        if two_factor {
            store.set_two_factor_code("user_alice", "123456");
        }
        store
    }

    fn request(identity: &str, secret: &str) -> AuthRequest {
        AuthRequest {
            identity: identity.to_string(),
            secret: Password::new(secret.to_string()),
            ip_address: "10.0.0.1".to_string(),
            user_agent: "test-agent".to_string(),
            two_factor_code: None,
            remember_me: false,
        }
    }

    #[tokio::test]
    async fn test_successful_authentication() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(false)).unwrap();

        let grant = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap();

        assert_eq!(grant.context.user_id, "user_alice");
        assert!(grant.context.has_permission(Permission::Read));
        assert_eq!(grant.access_token.token.split('.').count(), 3);

        let context = orchestrator
            .validate(&grant.access_token.token, "10.0.0.1", Some("test-agent"))
            .await
            .unwrap();
        assert_eq!(context.user_id, "user_alice");
        assert_eq!(context.session_id, grant.session_id);
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credential() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(false)).unwrap();

        let err = orchestrator
            .authenticate(request("alice", "wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidCredential));
    }

    #[tokio::test]
    async fn test_unknown_identity_is_invalid_credential() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(false)).unwrap();

        let err = orchestrator
            .authenticate(request("bob", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidCredential));
    }

    #[tokio::test]
    async fn test_lockout_after_repeated_failures() {
        let mut config = test_config();
        config.lockout = LockoutConfig {
            max_failed_attempts: 5,
            window_seconds: 900,
            lockout_duration_seconds: 900,
        };
        let orchestrator =
            SecurityOrchestrator::in_memory(config, store_with_alice(false)).unwrap();

        for _ in 0..5 {
            let err = orchestrator
                .authenticate(request("alice", "wrong-password"))
                .await
                .unwrap_err();
            assert!(matches!(err, SecurityError::InvalidCredential));
        }

        // Locked now: even the correct password is rejected without a
        // credential check.
        let err = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::AccountLocked { .. }));
    }

    #[tokio::test]
    async fn test_lockout_expires_lazily_and_success_clears_counter() {
        let mut config = test_config();
        config.lockout = LockoutConfig {
            max_failed_attempts: 2,
            window_seconds: 900,
            lockout_duration_seconds: 1,
        };
        let orchestrator =
            SecurityOrchestrator::in_memory(config, store_with_alice(false)).unwrap();

        for _ in 0..2 {
            let _ = orchestrator
                .authenticate(request("alice", "wrong-password"))
                .await;
        }
        assert!(matches!(
            orchestrator
                .authenticate(request("alice", GOOD_PASSWORD))
                .await
                .unwrap_err(),
            SecurityError::AccountLocked { .. }
        ));

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        // Lock has lapsed; correct credentials succeed and clear the state.
        let grant = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap();
        assert_eq!(grant.context.user_id, "user_alice");
        assert!(orchestrator.lockouts.get("alice").is_none());
    }

    #[tokio::test]
    async fn test_two_factor_is_a_mandatory_gate() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(true)).unwrap();

        let err = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::TwoFactorRequired));

        let mut bad_code = request("alice", GOOD_PASSWORD);
        bad_code.two_factor_code = Some("000000".to_string());
        let err = orchestrator.authenticate(bad_code).await.unwrap_err();
        assert!(matches!(err, SecurityError::TwoFactorInvalid));

        let mut good_code = request("alice", GOOD_PASSWORD);
        good_code.two_factor_code = Some("123456".to_string());
        assert!(orchestrator.authenticate(good_code).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_denies_before_credentials() {
        let mut config = test_config();
        config.rate_limit.login_attempts = 2;
        config.rate_limit.login_window_seconds = 60;
        let orchestrator =
            SecurityOrchestrator::in_memory(config, store_with_alice(false)).unwrap();

        assert!(orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .is_ok());
        assert!(orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .is_ok());

        let err = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::RateLimited));
    }

    #[tokio::test]
    async fn test_threatening_identity_is_blocked() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(false)).unwrap();

        let err = orchestrator
            .authenticate(request("alice' OR 1=1", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::ThreatDetected));
    }

    #[tokio::test]
    async fn test_suspicious_ip_is_denied_before_credentials() {
        let mut config = test_config();
        config.audit.failed_attempt_threshold = 3;
        // Keep lockout out of the way so suspicion is what fires.
        config.lockout.max_failed_attempts = 100;
        let orchestrator =
            SecurityOrchestrator::in_memory(config, store_with_alice(false)).unwrap();

        for _ in 0..3 {
            let _ = orchestrator
                .authenticate(request("alice", "wrong-password"))
                .await;
        }

        let err = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::SuspiciousActivity));
    }

    #[tokio::test]
    async fn test_validate_rejects_terminated_session() {
        let orchestrator =
            SecurityOrchestrator::in_memory(test_config(), store_with_alice(false)).unwrap();

        let grant = orchestrator
            .authenticate(request("alice", GOOD_PASSWORD))
            .await
            .unwrap();

        orchestrator
            .terminate_session(&grant.session_id, "logout")
            .await
            .unwrap();

        let err = orchestrator
            .validate(&grant.access_token.token, "10.0.0.1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SecurityError::SessionExpired));
    }
}

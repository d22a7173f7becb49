//! Signed token issuance and validation.
//!
//! Tokens are HS256 JWTs: three dot-separated base64url segments with an
//! HMAC signature over header and payload. Each token kind carries its own
//! TTL; revocation is tracked by jti in a pluggable store.

mod revocation;

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use revocation::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};

use crate::config::TokenConfig;
use crate::error::SecurityError;
use crate::models::{Permission, SecurityLevel};

/// Token kinds, each with an independent TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
    Verification,
}

/// Claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Bound session id
    pub sid: String,
    pub permissions: HashSet<Permission>,
    /// Security level of the authenticated identity
    pub lvl: SecurityLevel,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// Unique token id, tracked for revocation
    pub jti: String,
    /// Token kind, checked against the caller's expectation
    pub typ: TokenKind,
}

/// An issued token with its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates, and revokes signed tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig, revocations: Arc<dyn RevocationStore>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            encoding_key,
            decoding_key,
            config,
            revocations,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => Duration::minutes(self.config.access_ttl_minutes),
            TokenKind::Refresh => Duration::days(self.config.refresh_ttl_days),
            TokenKind::Reset => Duration::minutes(self.config.reset_ttl_minutes),
            TokenKind::Verification => Duration::minutes(self.config.verification_ttl_minutes),
        }
    }

    /// Issue a signed token of `kind` bound to a subject and session.
    pub fn issue(
        &self,
        kind: TokenKind,
        subject: &str,
        session_id: &str,
        permissions: &HashSet<Permission>,
        level: SecurityLevel,
    ) -> Result<IssuedToken, SecurityError> {
        let now = Utc::now();
        let expires_at = now + self.ttl(kind);

        let claims = TokenClaims {
            sub: subject.to_string(),
            sid: session_id.to_string(),
            permissions: permissions.clone(),
            lvl: level,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            typ: kind,
        };

        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SecurityError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))?;

        tracing::debug!(
            subject = %subject,
            session_id = %session_id,
            jti = %claims.jti,
            kind = ?kind,
            "Token issued"
        );

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    pub fn issue_access(
        &self,
        subject: &str,
        session_id: &str,
        permissions: &HashSet<Permission>,
        level: SecurityLevel,
    ) -> Result<IssuedToken, SecurityError> {
        self.issue(TokenKind::Access, subject, session_id, permissions, level)
    }

    pub fn issue_refresh(
        &self,
        subject: &str,
        session_id: &str,
        permissions: &HashSet<Permission>,
        level: SecurityLevel,
    ) -> Result<IssuedToken, SecurityError> {
        self.issue(TokenKind::Refresh, subject, session_id, permissions, level)
    }

    pub fn issue_reset(&self, subject: &str, session_id: &str) -> Result<IssuedToken, SecurityError> {
        self.issue(
            TokenKind::Reset,
            subject,
            session_id,
            &HashSet::new(),
            SecurityLevel::Low,
        )
    }

    pub fn issue_verification(
        &self,
        subject: &str,
        session_id: &str,
    ) -> Result<IssuedToken, SecurityError> {
        self.issue(
            TokenKind::Verification,
            subject,
            session_id,
            &HashSet::new(),
            SecurityLevel::Low,
        )
    }

    /// Validate a token against the expected kind.
    ///
    /// Checks signature, expiry, issuer/audience, kind, and revocation, in
    /// that order. Callers only learn pass/fail; the precise reason is
    /// logged internally so the public surface is not a validation oracle.
    pub async fn validate(&self, token: &str, expected: TokenKind) -> Option<TokenClaims> {
        match self.check(token, expected).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, kind = ?expected, "Token validation failed");
                None
            }
        }
    }

    /// Typed validation path for internal callers that log or audit the
    /// denial reason.
    pub async fn check(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, SecurityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
                _ => SecurityError::TokenMalformed,
            }
        })?;

        if data.claims.typ != expected {
            return Err(SecurityError::TokenMalformed);
        }

        match self.revocations.is_revoked(&data.claims.jti).await {
            Ok(false) => Ok(data.claims),
            Ok(true) => Err(SecurityError::TokenRevoked),
            // Revocation store unreachable: fail closed.
            Err(e) => {
                tracing::error!(error = %e, "Revocation store unreachable; rejecting token");
                Err(SecurityError::TokenRevoked)
            }
        }
    }

    /// Revoke a token for the remainder of its natural lifetime.
    ///
    /// Idempotent: revoking twice has the same observable effect as once.
    /// Returns false for tokens that cannot be parsed or are already past
    /// expiry.
    pub async fn revoke(&self, token: &str) -> Result<bool, SecurityError> {
        // Expired tokens are already rejected by validation; nothing to track.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = match decode::<TokenClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "Revocation skipped for invalid token");
                return Ok(false);
            }
        };

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let remaining = (expires_at - Utc::now()).num_seconds().max(1);

        self.revocations
            .revoke(&data.claims.jti, remaining)
            .await
            .map_err(SecurityError::Internal)?;

        tracing::info!(jti = %data.claims.jti, sub = %data.claims.sub, "Token revoked");
        Ok(true)
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool, SecurityError> {
        self.revocations
            .is_revoked(jti)
            .await
            .map_err(SecurityError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            test_config().token,
            Arc::new(MemoryRevocationStore::new()),
        )
    }

    fn permissions() -> HashSet<Permission> {
        [Permission::Read, Permission::Write].into_iter().collect()
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let issuer = issuer();
        let issued = issuer
            .issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard)
            .unwrap();

        assert_eq!(issued.token.split('.').count(), 3);

        let claims = issuer.validate(&issued.token, TokenKind::Access).await.unwrap();
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.sid, "session_1");
        assert_eq!(claims.permissions, permissions());
        assert_eq!(claims.jti, issued.jti);
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected() {
        let issuer = issuer();
        let refresh = issuer
            .issue_refresh("user_1", "session_1", &permissions(), SecurityLevel::Standard)
            .unwrap();

        // Signature and expiry are fine; the kind alone fails it.
        assert!(issuer.validate(&refresh.token, TokenKind::Access).await.is_none());
        assert!(issuer.validate(&refresh.token, TokenKind::Refresh).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let mut config = test_config().token;
        config.access_ttl_minutes = 0;
        let issuer = TokenIssuer::new(config, Arc::new(MemoryRevocationStore::new()));

        let issued = issuer.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert!(issuer.validate(&issued.token, TokenKind::Access).await.is_none());

        let err = issuer.check(&issued.token, TokenKind::Access).await.unwrap_err();
        assert!(matches!(err, SecurityError::TokenExpired));
    }

    #[tokio::test]
    async fn test_tampered_token_is_rejected() {
        let issuer = issuer();
        let issued = issuer.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();

        let mut tampered = issued.token.clone();
        tampered.truncate(tampered.len() - 4);
        tampered.push_str("AAAA");
        assert!(issuer.validate(&tampered, TokenKind::Access).await.is_none());

        assert!(issuer.validate("not-a-token", TokenKind::Access).await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_issuer_is_rejected() {
        let issuer_a = issuer();
        let mut config_b = test_config().token;
        config_b.issuer = "someone-else".to_string();
        let issuer_b = TokenIssuer::new(config_b, Arc::new(MemoryRevocationStore::new()));

        let issued = issuer_b.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();
        assert!(issuer_a.validate(&issued.token, TokenKind::Access).await.is_none());
    }

    #[tokio::test]
    async fn test_revocation_is_idempotent_and_permanent() {
        let issuer = issuer();
        let issued = issuer.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();

        assert!(issuer.validate(&issued.token, TokenKind::Access).await.is_some());

        assert!(issuer.revoke(&issued.token).await.unwrap());
        assert!(issuer.validate(&issued.token, TokenKind::Access).await.is_none());
        assert!(issuer.is_revoked(&issued.jti).await.unwrap());

        // Second revocation: same observable effect.
        assert!(issuer.revoke(&issued.token).await.unwrap());
        assert!(issuer.validate(&issued.token, TokenKind::Access).await.is_none());

        let err = issuer.check(&issued.token, TokenKind::Access).await.unwrap_err();
        assert!(matches!(err, SecurityError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_revoking_garbage_returns_false() {
        let issuer = issuer();
        assert!(!issuer.revoke("garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_jtis_are_unique() {
        let issuer = issuer();
        let a = issuer.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();
        let b = issuer.issue_access("user_1", "session_1", &permissions(), SecurityLevel::Standard).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}

//! Authentication and session security engine.
//!
//! `authguard` bundles the security concerns an authentication service needs
//! behind one façade: credential verification with account lockout, JWT
//! issuance and revocation, concurrent-session management, sliding-window
//! rate limiting, threat-pattern auditing, and password policy enforcement.
//!
//! The [`SecurityOrchestrator`] is the composition root. Every backing store
//! is a trait with an in-memory implementation for tests and single-instance
//! deployments and a Redis implementation for multi-instance ones.
//!
//! ```no_run
//! use std::sync::Arc;
//! use authguard::{
//!     AuthRequest, MemoryCredentialStore, Password, SecurityConfig,
//!     SecurityOrchestrator,
//! };
//!
//! # async fn run() -> Result<(), authguard::SecurityError> {
//! let config = SecurityConfig::from_env()?;
//! let credentials = Arc::new(MemoryCredentialStore::new());
//! let orchestrator = SecurityOrchestrator::in_memory(config, credentials)?;
//!
//! let grant = orchestrator
//!     .authenticate(AuthRequest {
//!         identity: "alice".to_string(),
//!         secret: Password::new("correct horse battery staple".to_string()),
//!         ip_address: "203.0.113.7".to_string(),
//!         user_agent: "curl/8.0".to_string(),
//!         two_factor_code: None,
//!         remember_me: false,
//!     })
//!     .await?;
//!
//! let context = orchestrator
//!     .validate(&grant.access_token.token, "203.0.113.7", None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod password;
pub mod ratelimit;
pub mod session;
pub mod token;

pub use audit::ThreatAuditor;
pub use config::SecurityConfig;
pub use crypto::{hash_password, verify_password, CryptoManager, Password, PasswordHashString};
pub use error::SecurityError;
pub use models::{
    Permission, SecurityContext, SecurityEvent, SecurityEventType, SecurityLevel, SessionRecord,
    SessionStatus, Severity,
};
pub use orchestrator::{
    AuthGrant, AuthRequest, CredentialStore, IdentityRecord, MemoryCredentialStore,
    SecurityOrchestrator,
};
pub use password::{
    PasswordPolicy, PasswordPolicyEngine, PasswordValidation, PolicyViolation, UserInfo,
};
pub use ratelimit::{MemoryRateLimiter, RateLimitStore, RedisRateLimiter};
pub use session::{MemorySessionStore, RedisSessionStore, SessionManager, SessionStore};
pub use token::{
    IssuedToken, MemoryRevocationStore, RedisRevocationStore, RevocationStore, TokenClaims,
    TokenIssuer, TokenKind,
};

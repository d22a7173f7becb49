//! Engine configuration.
//!
//! Loaded from the environment with per-field defaults in dev and strict
//! required-variable handling in prod. Tests construct the structs directly.

use anyhow::anyhow;
use serde::Deserialize;
use std::env;

use crate::error::SecurityError;
use crate::password::PasswordPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub session: SessionConfig,
    pub token: TokenConfig,
    pub lockout: LockoutConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
    pub password_policy: PasswordPolicy,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Cap on concurrently Active sessions per user; creating one more
    /// evicts the least-recently-active session.
    pub max_concurrent_sessions: usize,
    pub default_timeout_minutes: i64,
    pub max_timeout_minutes: i64,
    pub remember_me_days: i64,
    /// When false, a validation from a different ip suspends the session.
    pub allow_ip_change: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub reset_ttl_minutes: i64,
    pub verification_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_failed_attempts: u32,
    /// Rolling window within which failed attempts accumulate.
    pub window_seconds: i64,
    pub lockout_duration_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Failed attempts per ip within the window before the ip is suspicious.
    pub failed_attempt_threshold: usize,
    /// High-severity events per ip within the window before it is suspicious.
    pub event_threshold: usize,
    pub window_minutes: i64,
    /// Retention bound for the in-memory append-only logs.
    pub retention_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 5,
            default_timeout_minutes: 30,
            max_timeout_minutes: 480,
            remember_me_days: 30,
            allow_ip_change: false,
        }
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            window_seconds: 900,
            lockout_duration_seconds: 900,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: 10,
            login_window_seconds: 60,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            failed_attempt_threshold: 10,
            event_threshold: 5,
            window_minutes: 60,
            retention_minutes: 24 * 60,
        }
    }
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, SecurityError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| SecurityError::Internal(anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = SecurityConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("authguard"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            session: SessionConfig {
                max_concurrent_sessions: parse_env(
                    "SESSION_MAX_CONCURRENT",
                    Some("5"),
                    is_prod,
                )?,
                default_timeout_minutes: parse_env(
                    "SESSION_DEFAULT_TIMEOUT_MINUTES",
                    Some("30"),
                    is_prod,
                )?,
                max_timeout_minutes: parse_env(
                    "SESSION_MAX_TIMEOUT_MINUTES",
                    Some("480"),
                    is_prod,
                )?,
                remember_me_days: parse_env("SESSION_REMEMBER_ME_DAYS", Some("30"), is_prod)?,
                allow_ip_change: parse_env("SESSION_ALLOW_IP_CHANGE", Some("false"), is_prod)?,
            },
            token: TokenConfig {
                secret: get_env("TOKEN_SECRET", None, is_prod)?,
                issuer: get_env("TOKEN_ISSUER", Some("authguard"), is_prod)?,
                audience: get_env("TOKEN_AUDIENCE", Some("authguard-clients"), is_prod)?,
                access_ttl_minutes: parse_env("TOKEN_ACCESS_TTL_MINUTES", Some("60"), is_prod)?,
                refresh_ttl_days: parse_env("TOKEN_REFRESH_TTL_DAYS", Some("30"), is_prod)?,
                reset_ttl_minutes: parse_env("TOKEN_RESET_TTL_MINUTES", Some("15"), is_prod)?,
                verification_ttl_minutes: parse_env(
                    "TOKEN_VERIFICATION_TTL_MINUTES",
                    Some("15"),
                    is_prod,
                )?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: parse_env("LOCKOUT_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?,
                window_seconds: parse_env("LOCKOUT_WINDOW_SECONDS", Some("900"), is_prod)?,
                lockout_duration_seconds: parse_env(
                    "LOCKOUT_DURATION_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("10"), is_prod)?,
                login_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
            audit: AuditConfig {
                failed_attempt_threshold: parse_env(
                    "AUDIT_FAILED_ATTEMPT_THRESHOLD",
                    Some("10"),
                    is_prod,
                )?,
                event_threshold: parse_env("AUDIT_EVENT_THRESHOLD", Some("5"), is_prod)?,
                window_minutes: parse_env("AUDIT_WINDOW_MINUTES", Some("60"), is_prod)?,
                retention_minutes: parse_env("AUDIT_RETENTION_MINUTES", Some("1440"), is_prod)?,
            },
            password_policy: PasswordPolicy::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SecurityError> {
        if self.token.secret.len() < 32 {
            return Err(SecurityError::Internal(anyhow!(
                "TOKEN_SECRET must be at least 32 bytes"
            )));
        }

        if self.session.max_concurrent_sessions == 0 {
            return Err(SecurityError::Internal(anyhow!(
                "SESSION_MAX_CONCURRENT must be greater than 0"
            )));
        }

        if self.session.default_timeout_minutes > self.session.max_timeout_minutes {
            return Err(SecurityError::Internal(anyhow!(
                "SESSION_DEFAULT_TIMEOUT_MINUTES exceeds SESSION_MAX_TIMEOUT_MINUTES"
            )));
        }

        if self.lockout.max_failed_attempts == 0 {
            return Err(SecurityError::Internal(anyhow!(
                "LOCKOUT_MAX_FAILED_ATTEMPTS must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod && self.token.secret == "dev-secret" {
            return Err(SecurityError::Internal(anyhow!(
                "Placeholder token secret not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, SecurityError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(SecurityError::Internal(anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(SecurityError::Internal(anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, SecurityError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| SecurityError::Internal(anyhow!("Invalid value for {}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> SecurityConfig {
    SecurityConfig {
        environment: Environment::Dev,
        service_name: "authguard-test".to_string(),
        log_level: "debug".to_string(),
        session: SessionConfig::default(),
        token: TokenConfig {
            secret: "test-secret-test-secret-test-secret-1234".to_string(),
            issuer: "authguard".to_string(),
            audience: "authguard-clients".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_days: 30,
            reset_ttl_minutes: 15,
            verification_ttl_minutes: 15,
        },
        lockout: LockoutConfig::default(),
        rate_limit: RateLimitConfig::default(),
        audit: AuditConfig::default(),
        password_policy: PasswordPolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = test_config();
        config.token.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_session_cap_is_rejected() {
        let mut config = test_config();
        config.session.max_concurrent_sessions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_timeout_must_not_exceed_max() {
        let mut config = test_config();
        config.session.default_timeout_minutes = 1000;
        config.session.max_timeout_minutes = 480;
        assert!(config.validate().is_err());
    }
}

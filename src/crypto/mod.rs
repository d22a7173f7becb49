//! Cryptographic primitives: password hashing, HMAC signing, secure random
//! token generation, and digest fingerprints.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(****)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2id with a freshly generated salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns Ok(()) on a match; the comparison inside argon2 is constant-time.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

/// HMAC signing and secure-random generation bound to the engine's secret.
#[derive(Clone)]
pub struct CryptoManager {
    secret: Vec<u8>,
}

impl CryptoManager {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Generate a secure random token of `len` bytes, hex encoded.
    pub fn generate_token(&self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// HMAC-SHA256 tag over `data`, hex encoded.
    pub fn hmac_sign(&self, data: &[u8]) -> Result<String, anyhow::Error> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("Failed to initialize HMAC: {}", e))?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time verification of an HMAC tag produced by [`hmac_sign`].
    ///
    /// [`hmac_sign`]: CryptoManager::hmac_sign
    pub fn hmac_verify(&self, data: &[u8], tag_hex: &str) -> Result<bool, anyhow::Error> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("Failed to initialize HMAC: {}", e))?;
        mac.update(data);
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(tag_hex).unwrap_or_default();
        Ok(expected.as_slice().ct_eq(provided.as_slice()).into())
    }

    /// SHA-256 hex digest, used to store token fingerprints instead of raw
    /// token material.
    pub fn fingerprint(&self, data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_produces_argon2_hash() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_password(&password, &hash).is_ok());
    }

    #[test]
    fn test_verify_password_rejects_wrong_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        let wrong = Password::new("wrongPassword".to_string());
        assert!(verify_password(&wrong, &hash).is_err());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        // Random salt per hash
        assert_ne!(hash1.as_str(), hash2.as_str());
    }

    #[test]
    fn test_hmac_round_trip() {
        let crypto = CryptoManager::new("unit-test-secret");
        let tag = crypto.hmac_sign(b"payload").expect("sign failed");

        assert!(crypto.hmac_verify(b"payload", &tag).expect("verify failed"));
        assert!(!crypto.hmac_verify(b"tampered", &tag).expect("verify failed"));
        assert!(!crypto.hmac_verify(b"payload", "not-hex").expect("verify failed"));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let crypto = CryptoManager::new("unit-test-secret");
        let a = crypto.generate_token(32);
        let b = crypto.generate_token(32);

        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let crypto = CryptoManager::new("unit-test-secret");
        assert_eq!(crypto.fingerprint("token"), crypto.fingerprint("token"));
        assert_ne!(crypto.fingerprint("token"), crypto.fingerprint("other"));
    }

    #[test]
    fn test_password_debug_does_not_leak() {
        let password = Password::new("topsecret".to_string());
        assert!(!format!("{:?}", password).contains("topsecret"));
    }
}

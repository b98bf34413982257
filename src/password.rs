//! Credential hashing and password policy.
//!
//! Argon2id with a random per-credential salt. Verification is
//! constant-time by construction; a hashing fault is fatal to the
//! calling operation.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordConfig;
use crate::errors::AuthError;

/// Common passwords rejected outright regardless of policy.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "12345678", "123456789", "qwertyuio", "letmein", "welcome1", "password1",
];

pub struct PasswordService {
    config: PasswordConfig,
}

impl PasswordService {
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.config.argon2_memory_kib,
            self.config.argon2_iterations,
            self.config.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a secret with a fresh random salt. Called on every password
    /// set; stored hashes are never recomputed on read.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verify a secret against a stored hash. A mismatch is `Ok(false)`;
    /// an unparseable stored hash is an internal fault.
    pub fn verify(&self, secret: &str, credential_hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(credential_hash)
            .map_err(|e| AuthError::Internal(format!("stored credential hash invalid: {e}")))?;
        match self.hasher()?.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("password verification failed: {e}"))),
        }
    }

    /// Enforce the configured password policy.
    pub fn validate_strength(&self, secret: &str) -> Result<(), AuthError> {
        if secret.len() < self.config.min_length {
            return Err(AuthError::WeakPassword(format!(
                "password must be at least {} characters",
                self.config.min_length
            )));
        }
        if self.config.require_digit && !secret.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::WeakPassword(
                "password must contain at least one digit".to_string(),
            ));
        }
        if self.config.require_letter && !secret.chars().any(|c| c.is_alphabetic()) {
            return Err(AuthError::WeakPassword(
                "password must contain at least one letter".to_string(),
            ));
        }
        if self.config.require_special {
            let special = "!@#$%^&*()_+-=[]{}|;:,.<>?";
            if !secret.chars().any(|c| special.contains(c)) {
                return Err(AuthError::WeakPassword(
                    "password must contain at least one special character".to_string(),
                ));
            }
        }
        let lower = secret.to_lowercase();
        if COMMON_PASSWORDS.iter().any(|weak| lower == *weak) {
            return Err(AuthError::WeakPassword("password is too common".to_string()));
        }
        Ok(())
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new(PasswordConfig::default())
    }
}

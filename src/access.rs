//! Short-lived signed access credentials.
//!
//! Stateless HS256 JWTs embedding the account identity. Not revocable
//! before natural expiry; logout and password changes only prevent
//! minting new ones. Keep the TTL short.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;
use crate::types::Account;

/// Claims carried by an access credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id.
    pub sub: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

pub struct AccessTokenService {
    secret: zeroize::Zeroizing<String>,
    ttl_secs: u64,
}

impl AccessTokenService {
    /// Construct with signing-secret strength validation: short or
    /// well-known secrets are rejected outright rather than silently
    /// weakening every credential issued.
    pub fn new(secret: String, ttl_secs: u64) -> Result<Self, AuthError> {
        if secret.len() < 32 {
            return Err(AuthError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }
        const WEAK_SECRETS: &[&str] = &["secret", "password", "12345678", "changeme", "default"];
        let lower = secret.to_lowercase();
        for weak in WEAK_SECRETS {
            if lower.contains(weak) {
                return Err(AuthError::Validation(format!(
                    "weak JWT secret detected: contains '{weak}'"
                )));
            }
        }
        Ok(Self { secret: zeroize::Zeroizing::new(secret), ttl_secs })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a signed access credential for an account.
    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = AccessClaims {
            sub: account.id.to_string(),
            handle: account.handle.clone(),
            email: account.email.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_secs as i64,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AuthError::Internal(format!("access token signing failed: {e}")))
    }

    /// Verify signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
    }
}

//! Data model and request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-time capability token as persisted: only the digest of the raw
/// value plus its expiry. Hash and expiry always travel together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OneTimeToken {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Which account field a one-time token occupies. Purpose is structural:
/// a token minted for one purpose can never match another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    EmailChange,
}

/// Opaque client metadata attached to a session for display purposes
/// ("logged in from ..."). Never interpreted by the subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// One stored refresh-credential entry in an account's session set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntry {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub device: DeviceMeta,
}

impl SessionEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The persisted identity record. The account document is the unit of
/// consistency: all token and session mutations target exactly one
/// account and are applied as single conditional updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub handle: String,
    pub email: Option<String>,
    pub credential_hash: String,
    pub email_verified: bool,

    pub email_verification_token: Option<OneTimeToken>,
    pub password_reset_token: Option<OneTimeToken>,
    pub email_change_token: Option<OneTimeToken>,
    /// Pending address the email-change token is bound to.
    pub email_change_target: Option<String>,

    pub sessions: Vec<SessionEntry>,

    /// Set when the account has no email, making explicit that password
    /// recovery is impossible for it.
    pub acknowledged_no_recovery_email: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_credential_change_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a fresh account. Accounts without an email are considered
    /// verified immediately (there is nothing to verify) and carry the
    /// no-recovery acknowledgement.
    pub fn new(
        handle: String,
        email: Option<String>,
        credential_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        let has_email = email.is_some();
        Self {
            id: Uuid::new_v4(),
            handle,
            email,
            credential_hash,
            email_verified: !has_email,
            email_verification_token: None,
            password_reset_token: None,
            email_change_token: None,
            email_change_target: None,
            sessions: Vec::new(),
            acknowledged_no_recovery_email: !has_email,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            last_credential_change_at: None,
        }
    }

    /// The token slot bound to a purpose.
    pub fn token_slot(&self, purpose: TokenPurpose) -> &Option<OneTimeToken> {
        match purpose {
            TokenPurpose::EmailVerification => &self.email_verification_token,
            TokenPurpose::PasswordReset => &self.password_reset_token,
            TokenPurpose::EmailChange => &self.email_change_token,
        }
    }

    fn token_slot_mut(&mut self, purpose: TokenPurpose) -> &mut Option<OneTimeToken> {
        match purpose {
            TokenPurpose::EmailVerification => &mut self.email_verification_token,
            TokenPurpose::PasswordReset => &mut self.password_reset_token,
            TokenPurpose::EmailChange => &mut self.email_change_token,
        }
    }

    /// Install a freshly issued token, replacing any previous one for
    /// the same purpose (only the newest is valid).
    pub fn install_token(
        &mut self,
        purpose: TokenPurpose,
        token: OneTimeToken,
        email_change_target: Option<String>,
    ) {
        *self.token_slot_mut(purpose) = Some(token);
        if purpose == TokenPurpose::EmailChange {
            self.email_change_target = email_change_target;
        }
    }

    /// Clear-and-grant transition for a successfully validated token.
    ///
    /// Must run inside the repository's critical section so the clear
    /// and the grant are one atomic step. Clears the slot and applies
    /// the purpose-bound success effect:
    /// - email verification marks the address verified,
    /// - email change promotes the pending target and marks it verified,
    /// - password reset only clears (the caller re-hashes separately).
    pub fn apply_token_grant(&mut self, purpose: TokenPurpose) {
        *self.token_slot_mut(purpose) = None;
        match purpose {
            TokenPurpose::EmailVerification => {
                self.email_verified = true;
            }
            TokenPurpose::EmailChange => {
                if let Some(target) = self.email_change_target.take() {
                    self.email = Some(target);
                    self.email_verified = true;
                }
            }
            TokenPurpose::PasswordReset => {}
        }
    }

    pub fn find_session(&self, token_hash: &str) -> Option<&SessionEntry> {
        self.sessions.iter().find(|s| s.token_hash == token_hash)
    }

    /// Public projection, safe to hand to the request layer.
    pub fn to_view(&self) -> AccountView {
        AccountView {
            id: self.id,
            handle: self.handle.clone(),
            email: self.email.clone(),
            email_verified: self.email_verified,
            acknowledged_no_recovery_email: self.acknowledged_no_recovery_email,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// Serializable account projection without credential or token material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountView {
    pub id: Uuid,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    pub acknowledged_no_recovery_email: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub handle: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Explicit policy checkbox. Without an email it doubles as the
    /// acknowledgement that password recovery will be impossible.
    #[serde(default)]
    pub accept_policy: bool,
    #[serde(default)]
    pub device: DeviceMeta,
}

/// Login request; the identifier may be a handle or an email address.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub device: DeviceMeta,
}

/// The credential pair handed out on registration, login and refresh.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access credential lifetime in seconds.
    pub expires_in: u64,
}

/// Successful registration/login payload.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub account: AccountView,
    #[serde(flatten)]
    pub tokens: SessionTokens,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: Option<&str>) -> Account {
        Account::new(
            "alice".to_string(),
            email.map(str::to_string),
            "hash".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn test_new_account_without_email_is_verified() {
        let acc = account(None);
        assert!(acc.email_verified);
        assert!(acc.acknowledged_no_recovery_email);
    }

    #[test]
    fn test_new_account_with_email_is_unverified() {
        let acc = account(Some("a@x.com"));
        assert!(!acc.email_verified);
        assert!(!acc.acknowledged_no_recovery_email);
    }

    #[test]
    fn test_token_grant_clears_slot_and_verifies() {
        let mut acc = account(Some("a@x.com"));
        acc.install_token(
            TokenPurpose::EmailVerification,
            OneTimeToken { hash: "h".into(), expires_at: Utc::now() },
            None,
        );
        acc.apply_token_grant(TokenPurpose::EmailVerification);
        assert!(acc.email_verification_token.is_none());
        assert!(acc.email_verified);
    }

    #[test]
    fn test_email_change_grant_promotes_target() {
        let mut acc = account(Some("a@x.com"));
        acc.install_token(
            TokenPurpose::EmailChange,
            OneTimeToken { hash: "h".into(), expires_at: Utc::now() },
            Some("b@x.com".to_string()),
        );
        acc.apply_token_grant(TokenPurpose::EmailChange);
        assert_eq!(acc.email.as_deref(), Some("b@x.com"));
        assert!(acc.email_verified);
        assert!(acc.email_change_token.is_none());
        assert!(acc.email_change_target.is_none());
    }

    #[test]
    fn test_view_omits_secrets() {
        let acc = account(Some("a@x.com"));
        let json = serde_json::to_string(&acc.to_view()).unwrap();
        assert!(!json.contains("hash"));
        assert!(json.contains("alice"));
    }
}

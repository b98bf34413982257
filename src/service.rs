//! Registration, login and recovery orchestrator.
//!
//! Composes the credential hasher, one-time token primitive, session
//! manager and account repository into request-shaped workflows. Every
//! workflow is stateless across requests except through persisted
//! account fields; correctness under concurrency comes entirely from
//! the repository's atomic operations.

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::AccessTokenService;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::notify::{spawn_notify, NotificationDispatcher, SecurityEvent};
use crate::password::PasswordService;
use crate::session::SessionManager;
use crate::storage::AccountRepository;
use crate::token;
use crate::types::{
    Account, AccountView, AuthResponse, LoginRequest, OneTimeToken, RegisterRequest,
    SessionTokens, TokenPurpose,
};
use crate::validation::{normalize_email, validate_email, validate_handle};

pub struct AccountService {
    repo: Arc<dyn AccountRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    passwords: PasswordService,
    sessions: SessionManager,
    config: AuthConfig,
}

impl AccountService {
    /// Build the orchestrator. Fails fast on an unusable JWT secret.
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let access =
            AccessTokenService::new(config.jwt_secret.clone(), config.access_token_ttl_secs)?;
        let sessions = SessionManager::new(
            Arc::clone(&repo),
            access,
            Arc::clone(&clock),
            config.refresh_token_ttl_secs,
        );
        Ok(Self {
            repo,
            notifier,
            clock,
            passwords: PasswordService::new(config.password.clone()),
            sessions,
            config,
        })
    }

    /// Session manager, for the request layer's access-token checks and
    /// device listing.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn one_time_token(&self, ttl_secs: u64) -> (token::MintedToken, OneTimeToken) {
        let minted = token::mint();
        let stored = OneTimeToken {
            hash: minted.hash.clone(),
            expires_at: self.clock.now() + Duration::seconds(ttl_secs as i64),
        };
        (minted, stored)
    }

    /// Create an account, hand out its first session, and (when an
    /// email was supplied) start verification.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        validate_handle(&req.handle)?;
        self.passwords.validate_strength(&req.password)?;
        let email = match req.email.as_deref() {
            Some(raw) => {
                validate_email(raw)?;
                Some(normalize_email(raw))
            }
            None => None,
        };

        if !req.accept_policy {
            let detail = if email.is_some() {
                "the account policy must be accepted"
            } else {
                "registering without an email requires acknowledging that \
                 password recovery will be impossible"
            };
            return Err(AuthError::AcknowledgementRequired(detail.to_string()));
        }

        if self.repo.find_by_handle(&req.handle).await?.is_some() {
            return Err(AuthError::HandleTaken);
        }
        if let Some(ref email) = email {
            if self.repo.find_by_email(email).await?.is_some() {
                return Err(AuthError::EmailTaken);
            }
        }

        let credential_hash = self.passwords.hash(&req.password)?;
        let account = Account::new(req.handle, email, credential_hash, self.clock.now());

        // The pre-checks race with concurrent registrations; the
        // repository's uniqueness error converts to the same conflict.
        self.repo.create(&account).await?;
        info!("registered account {} ({})", account.handle, account.id);

        if account.email.is_some() {
            let (minted, stored) = self.one_time_token(self.config.verification_ttl_secs);
            self.repo
                .set_one_time_token(account.id, TokenPurpose::EmailVerification, stored, None)
                .await?;
            let notifier = Arc::clone(&self.notifier);
            let snapshot = account.clone();
            spawn_notify("verification", async move {
                notifier.send_verification(&snapshot, &minted.raw).await
            });
        }

        let tokens = self.sessions.issue(&account, req.device).await?;
        Ok(AuthResponse { account: account.to_view(), tokens })
    }

    /// Authenticate by handle or email plus password.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        let account = match self.repo.find_by_handle(&req.identifier).await? {
            Some(account) => Some(account),
            None => self.repo.find_by_email(&normalize_email(&req.identifier)).await?,
        };
        let Some(mut account) = account else {
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(&req.password, &account.credential_hash)? {
            warn!("failed login attempt for account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        if account.email.is_some()
            && !account.email_verified
            && !self.config.allow_unverified_login
        {
            return Err(AuthError::EmailNotVerified);
        }

        let now = self.clock.now();
        self.repo.record_login(account.id, now).await?;
        account.last_login_at = Some(now);
        info!("account {} logged in", account.id);

        let notifier = Arc::clone(&self.notifier);
        let snapshot = account.clone();
        let device = req.device.clone();
        spawn_notify("login alert", async move {
            notifier.send_security_alert(&snapshot, SecurityEvent::Login { device }).await
        });

        let tokens = self.sessions.issue(&account, req.device).await?;
        Ok(AuthResponse { account: account.to_view(), tokens })
    }

    /// Exchange a refresh credential for a fresh pair. Invalid and
    /// expired tokens are indistinguishable to the caller.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: crate::types::DeviceMeta,
    ) -> Result<SessionTokens, AuthError> {
        let (_, tokens) = self.sessions.rotate(refresh_token, device).await?;
        Ok(tokens)
    }

    /// Drop the session behind a refresh credential. Idempotent: a
    /// missing or unknown token is a no-op success.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        match refresh_token {
            None => Ok(()),
            Some(raw) => self.sessions.revoke_one(raw).await,
        }
    }

    /// Consume an email verification token.
    pub async fn verify_email(&self, raw_token: &str) -> Result<AccountView, AuthError> {
        let Some(account) = self.consume(TokenPurpose::EmailVerification, raw_token).await? else {
            return Err(AuthError::InvalidToken);
        };
        info!("email verified for account {}", account.id);

        let notifier = Arc::clone(&self.notifier);
        let snapshot = account.clone();
        spawn_notify("welcome", async move { notifier.send_welcome(&snapshot).await });

        Ok(account.to_view())
    }

    /// Re-issue a verification token. Uniform success shape regardless
    /// of whether the email exists or is already verified; the real
    /// outcome is only logged.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        match self.repo.find_by_email(&email).await? {
            Some(account) if !account.email_verified => {
                let (minted, stored) = self.one_time_token(self.config.verification_ttl_secs);
                self.repo
                    .set_one_time_token(account.id, TokenPurpose::EmailVerification, stored, None)
                    .await?;
                info!("re-issued verification token for account {}", account.id);
                let notifier = Arc::clone(&self.notifier);
                spawn_notify("verification", async move {
                    notifier.send_verification(&account, &minted.raw).await
                });
            }
            Some(account) => {
                info!("verification resend ignored: account {} already verified", account.id);
            }
            None => {
                info!("verification resend ignored: no account for supplied email");
            }
        }
        Ok(())
    }

    /// Start password recovery. Always returns the same success shape
    /// for unknown emails, ineligible accounts and eligible accounts;
    /// the true outcome appears only in the logs.
    pub async fn initiate_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        match self.repo.find_by_email(&email).await? {
            None => {
                info!("password reset ignored: no account for supplied email");
            }
            Some(account) if !account.email_verified => {
                info!("password reset ignored: account {} email unverified", account.id);
            }
            Some(account) => {
                let (minted, stored) = self.one_time_token(self.config.reset_ttl_secs);
                self.repo
                    .set_one_time_token(account.id, TokenPurpose::PasswordReset, stored, None)
                    .await?;
                info!("issued password reset token for account {}", account.id);
                let notifier = Arc::clone(&self.notifier);
                spawn_notify("password reset", async move {
                    notifier.send_password_reset(&account, &minted.raw).await
                });
            }
        }
        Ok(())
    }

    /// Consume a reset token, set the new credential and revoke every
    /// session in one persisted update.
    pub async fn complete_password_reset(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.passwords.validate_strength(new_password)?;
        let Some(account) = self.consume(TokenPurpose::PasswordReset, raw_token).await? else {
            return Err(AuthError::InvalidToken);
        };

        let credential_hash = self.passwords.hash(new_password)?;
        self.repo
            .replace_credential(account.id, &credential_hash, self.clock.now())
            .await?;
        info!("password reset completed for account {}", account.id);

        let notifier = Arc::clone(&self.notifier);
        spawn_notify("security alert", async move {
            notifier.send_security_alert(&account, SecurityEvent::PasswordReset).await
        });
        Ok(())
    }

    /// Authenticated password change; revokes every session.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.passwords.validate_strength(new_password)?;
        let account = self.repo.find_by_id(account_id).await?.ok_or(AuthError::NotFound)?;
        if !self.passwords.verify(current_password, &account.credential_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let credential_hash = self.passwords.hash(new_password)?;
        self.repo
            .replace_credential(account.id, &credential_hash, self.clock.now())
            .await?;
        info!("password changed for account {}", account.id);

        let notifier = Arc::clone(&self.notifier);
        spawn_notify("security alert", async move {
            notifier.send_security_alert(&account, SecurityEvent::PasswordChanged).await
        });
        Ok(())
    }

    /// Bind an email-change token to a pending target address. Covers
    /// both changing an existing address and adding a first one; the
    /// difference materializes at confirmation.
    pub async fn initiate_email_change(
        &self,
        account_id: Uuid,
        new_email: &str,
    ) -> Result<(), AuthError> {
        validate_email(new_email)?;
        let new_email = normalize_email(new_email);

        let account = self.repo.find_by_id(account_id).await?.ok_or(AuthError::NotFound)?;
        if account.email.as_deref() == Some(new_email.as_str()) {
            return Err(AuthError::Validation(
                "the supplied address is already the account email".to_string(),
            ));
        }
        if self.repo.find_by_email(&new_email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let (minted, stored) = self.one_time_token(self.config.email_change_ttl_secs);
        self.repo
            .set_one_time_token(
                account.id,
                TokenPurpose::EmailChange,
                stored,
                Some(new_email.clone()),
            )
            .await?;
        info!("issued email change token for account {}", account.id);

        let notifier = Arc::clone(&self.notifier);
        spawn_notify("email change", async move {
            notifier
                .send_email_change_verification(&account, &minted.raw, &new_email)
                .await
        });
        Ok(())
    }

    /// Consume an email-change token, promoting the pending address and
    /// marking it verified in the same atomic update.
    pub async fn confirm_email_change(&self, raw_token: &str) -> Result<AccountView, AuthError> {
        let Some(account) = self.consume(TokenPurpose::EmailChange, raw_token).await? else {
            return Err(AuthError::InvalidToken);
        };
        info!("email change confirmed for account {}", account.id);
        Ok(account.to_view())
    }

    /// Detach the email after re-authentication and an explicit
    /// acknowledgement that password recovery becomes impossible.
    pub async fn remove_email(
        &self,
        account_id: Uuid,
        current_password: &str,
        acknowledge_no_recovery: bool,
    ) -> Result<(), AuthError> {
        let account = self.repo.find_by_id(account_id).await?.ok_or(AuthError::NotFound)?;
        if account.email.is_none() {
            return Err(AuthError::Validation("account has no email to remove".to_string()));
        }
        if !self.passwords.verify(current_password, &account.credential_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !acknowledge_no_recovery {
            return Err(AuthError::AcknowledgementRequired(
                "removing the email requires acknowledging that password recovery \
                 will be impossible"
                    .to_string(),
            ));
        }

        self.repo.remove_email(account.id, self.clock.now()).await?;
        info!("email removed from account {}", account.id);

        // Alerts the (now former) address; snapshot predates removal.
        let notifier = Arc::clone(&self.notifier);
        spawn_notify("security alert", async move {
            notifier.send_security_alert(&account, SecurityEvent::EmailRemoved).await
        });
        Ok(())
    }

    /// Shared validation path: empty input short-circuits, otherwise
    /// the repository performs the atomic clear-and-grant. Missing,
    /// wrong and expired tokens are indistinguishable here.
    async fn consume(
        &self,
        purpose: TokenPurpose,
        raw_token: &str,
    ) -> Result<Option<Account>, AuthError> {
        if raw_token.is_empty() {
            info!("token validation failed: no token supplied ({purpose:?})");
            return Ok(None);
        }
        let hash = token::digest(raw_token);
        let outcome = self.repo.consume_one_time_token(purpose, &hash, self.clock.now()).await?;
        if outcome.is_none() {
            info!("token validation failed: no live match ({purpose:?})");
        }
        Ok(outcome)
    }
}

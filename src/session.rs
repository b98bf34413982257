//! Refresh-session management.
//!
//! Each account holds a set of long-lived refresh credentials, stored
//! by hash. Issuing, rotating and revoking them enables
//! logout-one-device and logout-everywhere without any server-side
//! state for the short-lived access credentials.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::{AccessClaims, AccessTokenService};
use crate::clock::Clock;
use crate::errors::AuthError;
use crate::storage::{AccountRepository, SessionRotation, StorageError};
use crate::token;
use crate::types::{Account, DeviceMeta, SessionEntry, SessionTokens};

/// How often to re-mint on a (vanishingly unlikely) global refresh-hash
/// collision before giving up.
const MINT_ATTEMPTS: usize = 3;

pub struct SessionManager {
    repo: Arc<dyn AccountRepository>,
    access: AccessTokenService,
    clock: Arc<dyn Clock>,
    refresh_ttl_secs: u64,
}

impl SessionManager {
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        access: AccessTokenService,
        clock: Arc<dyn Clock>,
        refresh_ttl_secs: u64,
    ) -> Self {
        Self { repo, access, clock, refresh_ttl_secs }
    }

    fn refresh_entry(&self, hash: String, device: DeviceMeta) -> SessionEntry {
        let now = self.clock.now();
        SessionEntry {
            token_hash: hash,
            expires_at: now + Duration::seconds(self.refresh_ttl_secs as i64),
            created_at: now,
            device,
        }
    }

    fn tokens(&self, account: &Account, refresh_raw: String) -> Result<SessionTokens, AuthError> {
        let access_token = self.access.issue(account, self.clock.now())?;
        Ok(SessionTokens {
            access_token,
            refresh_token: refresh_raw,
            token_type: "Bearer".to_string(),
            expires_in: self.access.ttl_secs(),
        })
    }

    /// Mint a refresh credential and append its session entry. Global
    /// hash uniqueness is lookup-before-accept inside the repository's
    /// atomic insert; a collision re-mints.
    pub async fn issue(
        &self,
        account: &Account,
        device: DeviceMeta,
    ) -> Result<SessionTokens, AuthError> {
        for _ in 0..MINT_ATTEMPTS {
            let minted = token::mint();
            let entry = self.refresh_entry(minted.hash, device.clone());
            match self.repo.insert_session(account.id, entry).await {
                Ok(()) => {
                    debug!("issued session for account {}", account.id);
                    return self.tokens(account, minted.raw);
                }
                Err(StorageError::Duplicate(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AuthError::Internal("could not mint a unique refresh token".to_string()))
    }

    /// Exchange a refresh credential for a fresh pair. Removal of the
    /// old entry and insertion of the new one is a single persisted
    /// update; after this call the supplied token is unusable whether
    /// or not it was valid.
    pub async fn rotate(
        &self,
        raw_refresh: &str,
        device: DeviceMeta,
    ) -> Result<(Account, SessionTokens), AuthError> {
        let old_hash = token::digest(raw_refresh);
        let now = self.clock.now();

        for _ in 0..MINT_ATTEMPTS {
            let minted = token::mint();
            let replacement = self.refresh_entry(minted.hash, device.clone());
            match self.repo.rotate_session(&old_hash, replacement, now).await {
                Ok(SessionRotation::Rotated(account)) => {
                    debug!("rotated session for account {}", account.id);
                    let tokens = self.tokens(&account, minted.raw)?;
                    return Ok((account, tokens));
                }
                Ok(SessionRotation::Missing) => {
                    debug!("refresh rotation failed: no matching session");
                    return Err(AuthError::InvalidToken);
                }
                Ok(SessionRotation::Expired) => {
                    debug!("refresh rotation failed: session expired");
                    return Err(AuthError::InvalidToken);
                }
                Err(StorageError::Duplicate(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AuthError::Internal("could not mint a unique refresh token".to_string()))
    }

    /// Remove the session matching a refresh credential. Idempotent:
    /// an unknown token is a no-op success so logout never leaks
    /// whether a credential was live.
    pub async fn revoke_one(&self, raw_refresh: &str) -> Result<(), AuthError> {
        let hash = token::digest(raw_refresh);
        let Some(account) = self.repo.find_by_session_token_hash(&hash).await? else {
            debug!("revoke ignored: no session matches supplied token");
            return Ok(());
        };
        self.repo.remove_session(account.id, &hash).await?;
        info!("revoked one session for account {}", account.id);
        Ok(())
    }

    /// Drop every session for an account (logout-everywhere).
    pub async fn revoke_all(&self, account_id: Uuid) -> Result<(), AuthError> {
        self.repo.clear_sessions(account_id).await?;
        info!("revoked all sessions for account {account_id}");
        Ok(())
    }

    /// Validate a short-lived access credential for the request layer.
    pub fn verify_access(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.access.verify(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryRepository;
    use chrono::Utc;

    const SECRET: &str = "correct-horse-battery-staple-0042!";

    fn manager(repo: Arc<MemoryRepository>, clock: Arc<ManualClock>) -> SessionManager {
        SessionManager::new(
            repo,
            AccessTokenService::new(SECRET.to_string(), 900).unwrap(),
            clock,
            3600,
        )
    }

    async fn seeded(repo: &MemoryRepository) -> Account {
        let account =
            Account::new("alice".to_string(), None, "hash".to_string(), Utc::now());
        repo.create(&account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_issue_then_rotate_invalidates_old() {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mgr = manager(Arc::clone(&repo), Arc::clone(&clock));
        let account = seeded(&repo).await;

        let first = mgr.issue(&account, Default::default()).await.unwrap();
        let (_, second) =
            mgr.rotate(&first.refresh_token, Default::default()).await.unwrap();

        let err = mgr.rotate(&first.refresh_token, Default::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // Only the newest credential in the chain rotates.
        assert!(mgr.rotate(&second.refresh_token, Default::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_after_expiry_fails() {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mgr = manager(Arc::clone(&repo), Arc::clone(&clock));
        let account = seeded(&repo).await;

        let tokens = mgr.issue(&account, Default::default()).await.unwrap();
        clock.advance(Duration::hours(2));
        let err = mgr.rotate(&tokens.refresh_token, Default::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_revoke_one_is_idempotent() {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mgr = manager(Arc::clone(&repo), Arc::clone(&clock));
        let account = seeded(&repo).await;

        let tokens = mgr.issue(&account, Default::default()).await.unwrap();
        mgr.revoke_one(&tokens.refresh_token).await.unwrap();
        // Second revocation and garbage tokens are both no-op successes.
        mgr.revoke_one(&tokens.refresh_token).await.unwrap();
        mgr.revoke_one("never-issued").await.unwrap();

        let account = repo.find_by_id(account.id).await.unwrap().unwrap();
        assert!(account.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_all_clears_every_session() {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mgr = manager(Arc::clone(&repo), Arc::clone(&clock));
        let account = seeded(&repo).await;

        mgr.issue(&account, Default::default()).await.unwrap();
        mgr.issue(&account, Default::default()).await.unwrap();
        mgr.revoke_all(account.id).await.unwrap();

        let account = repo.find_by_id(account.id).await.unwrap().unwrap();
        assert!(account.sessions.is_empty());
    }
}

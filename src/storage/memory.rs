//! In-memory repository implementation.
//!
//! Reference implementation of the contract, used by the test suite
//! and by embedding applications that do not need durability. A single
//! `RwLock` over the account table makes every conditional update one
//! critical section, which is exactly the atomicity the trait demands.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::r#trait::{AccountRepository, SessionRotation};
use super::{DuplicateField, StorageError};
use crate::token::hashes_match;
use crate::types::{Account, OneTimeToken, SessionEntry, TokenPurpose};

#[derive(Default, Clone)]
pub struct MemoryRepository {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(
        accounts: &HashMap<Uuid, Account>,
        candidate: &Account,
    ) -> Result<(), StorageError> {
        for other in accounts.values() {
            if other.id == candidate.id {
                continue;
            }
            if other.handle == candidate.handle {
                return Err(StorageError::Duplicate(DuplicateField::Handle));
            }
            if let (Some(a), Some(b)) = (&other.email, &candidate.email) {
                if a == b {
                    return Err(StorageError::Duplicate(DuplicateField::Email));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryRepository {
    async fn create(&self, account: &Account) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        Self::check_unique(&accounts, account)?;
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StorageError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Account>, StorageError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.handle == handle).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email.as_deref() == Some(email)).cloned())
    }

    async fn find_by_session_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, StorageError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.sessions.iter().any(|s| s.token_hash == token_hash))
            .cloned())
    }

    async fn update(&self, account: &Account) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.id) {
            return Err(StorageError::NotFound);
        }
        Self::check_unique(&accounts, account)?;
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        accounts.remove(&id).map(|_| ()).ok_or(StorageError::NotFound)
    }

    async fn set_one_time_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        token: OneTimeToken,
        email_change_target: Option<String>,
    ) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.install_token(purpose, token, email_change_target);
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_one_time_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StorageError> {
        let mut accounts = self.accounts.write().await;

        let matched = accounts
            .values()
            .find(|a| {
                a.token_slot(purpose)
                    .as_ref()
                    .is_some_and(|t| hashes_match(&t.hash, token_hash) && !t.is_expired(now))
            })
            .map(|a| a.id);

        let Some(id) = matched else {
            return Ok(None);
        };

        // An email-change grant must not collide with an address claimed
        // since initiation. The token is spent either way.
        if purpose == TokenPurpose::EmailChange {
            let target = accounts
                .get(&id)
                .and_then(|a| a.email_change_target.clone());
            if let Some(target) = target {
                let taken = accounts
                    .values()
                    .any(|other| other.id != id && other.email.as_deref() == Some(&target));
                if taken {
                    let account = accounts.get_mut(&id).expect("matched above");
                    account.email_change_token = None;
                    account.email_change_target = None;
                    account.updated_at = now;
                    return Err(StorageError::Duplicate(DuplicateField::Email));
                }
            }
        }

        let account = accounts.get_mut(&id).expect("matched above");
        account.apply_token_grant(purpose);
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    async fn insert_session(&self, id: Uuid, entry: SessionEntry) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let collision = accounts
            .values()
            .any(|a| a.sessions.iter().any(|s| s.token_hash == entry.token_hash));
        if collision {
            return Err(StorageError::Duplicate(DuplicateField::SessionToken));
        }
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.updated_at = entry.created_at;
        account.sessions.push(entry);
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_token_hash: &str,
        replacement: SessionEntry,
        now: DateTime<Utc>,
    ) -> Result<SessionRotation, StorageError> {
        let mut accounts = self.accounts.write().await;

        let matched = accounts
            .values()
            .find(|a| a.sessions.iter().any(|s| s.token_hash == old_token_hash))
            .map(|a| a.id);
        let Some(id) = matched else {
            return Ok(SessionRotation::Missing);
        };

        let account = accounts.get_mut(&id).expect("matched above");
        let idx = account
            .sessions
            .iter()
            .position(|s| s.token_hash == old_token_hash)
            .expect("matched above");

        if account.sessions[idx].is_expired(now) {
            account.sessions.remove(idx);
            account.updated_at = now;
            return Ok(SessionRotation::Expired);
        }

        account.sessions.remove(idx);
        account.sessions.push(replacement);
        account.updated_at = now;
        Ok(SessionRotation::Rotated(account.clone()))
    }

    async fn remove_session(&self, id: Uuid, token_hash: &str) -> Result<bool, StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        let before = account.sessions.len();
        account.sessions.retain(|s| s.token_hash != token_hash);
        let removed = account.sessions.len() < before;
        if removed {
            account.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn clear_sessions(&self, id: Uuid) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.sessions.clear();
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_credential(
        &self,
        id: Uuid,
        credential_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.credential_hash = credential_hash.to_string();
        account.sessions.clear();
        account.last_credential_change_at = Some(now);
        account.updated_at = now;
        Ok(())
    }

    async fn record_login(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.last_login_at = Some(now);
        account.updated_at = now;
        Ok(())
    }

    async fn remove_email(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StorageError::NotFound)?;
        account.email = None;
        account.email_verified = true;
        account.acknowledged_no_recovery_email = true;
        account.email_verification_token = None;
        account.email_change_token = None;
        account.email_change_target = None;
        account.updated_at = now;
        Ok(())
    }
}

//! Repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::StorageError;
use crate::types::{Account, OneTimeToken, SessionEntry, TokenPurpose};

/// Outcome of an atomic session rotation.
#[derive(Debug)]
pub enum SessionRotation {
    /// Old entry removed and replacement inserted in one update; carries
    /// the account as persisted after the swap.
    Rotated(Account),
    /// No session with the supplied hash exists (never issued, already
    /// rotated away, or revoked).
    Missing,
    /// The entry existed but its expiry had passed; it has been removed.
    Expired,
}

/// Persistence contract for the account entity.
///
/// Methods that read state, decide, and write MUST be single atomic
/// updates in any implementation — the subsystem performs no in-process
/// locking of its own. The atomic units are: `create` (uniqueness
/// check + insert), `consume_one_time_token`, `rotate_session`,
/// `insert_session` and `replace_credential`. Splitting any of them
/// into separate read and write steps reintroduces double-spend races
/// on tokens and refresh credentials.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account. Fails with `Duplicate` if the handle or
    /// email is already in use.
    async fn create(&self, account: &Account) -> Result<(), StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StorageError>;

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Account>, StorageError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StorageError>;

    /// Look up the account holding a session with this refresh-token
    /// hash. Backs the global session-hash uniqueness check.
    async fn find_by_session_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Account>, StorageError>;

    /// Replace the stored document wholesale, enforcing uniqueness.
    /// For administrative edits; concurrent-safe flows use the targeted
    /// operations below.
    async fn update(&self, account: &Account) -> Result<(), StorageError>;

    /// Remove the account record. Cascading deletion of dependent
    /// records is the caller's responsibility (dependents first).
    async fn delete(&self, id: Uuid) -> Result<(), StorageError>;

    /// Install a one-time token on its purpose slot, overwriting any
    /// previous token for that purpose. For `EmailChange` the pending
    /// target address is bound in the same update.
    async fn set_one_time_token(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        token: OneTimeToken,
        email_change_target: Option<String>,
    ) -> Result<(), StorageError>;

    /// Atomic clear-and-grant: find the account whose `purpose` slot
    /// matches `token_hash` and is unexpired, clear the slot and apply
    /// the purpose's success transition, all in one conditional update.
    /// Returns the account as persisted after the grant, or `None` if
    /// no live match exists (missing, wrong value, or expired — the
    /// caller cannot distinguish).
    ///
    /// An `EmailChange` grant whose pending target has meanwhile been
    /// claimed by another account still consumes the token but fails
    /// with `Duplicate(Email)` and leaves the address unchanged.
    async fn consume_one_time_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, StorageError>;

    /// Append a session entry. Fails with `Duplicate(SessionToken)` if
    /// any account already holds the hash.
    async fn insert_session(&self, id: Uuid, entry: SessionEntry) -> Result<(), StorageError>;

    /// Atomically remove the session matching `old_token_hash` and
    /// insert `replacement`. There is no window in which both the old
    /// and the new refresh credential validate.
    async fn rotate_session(
        &self,
        old_token_hash: &str,
        replacement: SessionEntry,
        now: DateTime<Utc>,
    ) -> Result<SessionRotation, StorageError>;

    /// Remove one session entry; `Ok(false)` when no such entry exists.
    async fn remove_session(&self, id: Uuid, token_hash: &str) -> Result<bool, StorageError>;

    async fn clear_sessions(&self, id: Uuid) -> Result<(), StorageError>;

    /// Set a new credential hash and clear the entire session set in
    /// one update, recording the credential-change timestamp.
    async fn replace_credential(
        &self,
        id: Uuid,
        credential_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    async fn record_login(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError>;

    /// Null the email and force the no-recovery acknowledgement,
    /// clearing any email-bound tokens in the same update.
    async fn remove_email(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError>;
}

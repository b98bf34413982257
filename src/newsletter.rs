//! Newsletter double opt-in.
//!
//! A second, simpler instance of the one-time-token pattern: a
//! subscriber record is created unconfirmed with a confirmation token,
//! becomes confirmed when the raw token is presented within its window,
//! and is swept away if it never confirms. The unsubscribe token has no
//! expiry; it lives as long as the subscription does.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::AuthError;
use crate::notify::{spawn_notify, NotifyError};
use crate::storage::StorageError;
use crate::token;
use crate::types::OneTimeToken;
use crate::validation::{normalize_email, validate_email};

/// A newsletter subscription record.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub email: String,
    pub confirmed: bool,
    pub confirmation_token: Option<OneTimeToken>,
    /// Hash of the standing unsubscribe capability; no expiry.
    pub unsubscribe_token_hash: String,
    pub owner_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract for subscribers. As with accounts, the methods
/// that decide and write are single atomic updates.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Insert a new record or, for an existing unconfirmed one, replace
    /// its confirmation token. A confirmed record is left untouched and
    /// reported as such.
    async fn upsert_pending(&self, subscriber: Subscriber) -> Result<UpsertOutcome, StorageError>;

    /// Atomic confirm: match an unexpired confirmation token hash, set
    /// `confirmed` and clear the token in one update.
    async fn confirm(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StorageError>;

    /// Remove the record holding this unsubscribe hash; `Ok(false)`
    /// when no such record exists.
    async fn remove_by_unsubscribe_hash(&self, token_hash: &str) -> Result<bool, StorageError>;

    /// Delete unconfirmed records whose confirmation window has passed.
    /// Returns how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    PendingRefreshed,
    AlreadyConfirmed,
}

/// Outbound confirmation delivery, injected like the account-side
/// dispatcher. Both the confirmation and unsubscribe raw tokens travel
/// in the same message.
#[async_trait]
pub trait NewsletterDispatcher: Send + Sync {
    async fn send_confirmation(
        &self,
        email: &str,
        confirm_token: &str,
        unsubscribe_token: &str,
    ) -> Result<(), NotifyError>;
}

pub struct NewsletterService {
    store: Arc<dyn SubscriberStore>,
    dispatcher: Arc<dyn NewsletterDispatcher>,
    clock: Arc<dyn Clock>,
    confirm_ttl_secs: u64,
}

impl NewsletterService {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        dispatcher: Arc<dyn NewsletterDispatcher>,
        clock: Arc<dyn Clock>,
        confirm_ttl_secs: u64,
    ) -> Self {
        Self { store, dispatcher, clock, confirm_ttl_secs }
    }

    /// Start (or restart) a subscription. Uniform success shape whether
    /// the address is new, pending or already confirmed; the outcome is
    /// only logged.
    pub async fn subscribe(
        &self,
        email: &str,
        owner_account_id: Option<Uuid>,
    ) -> Result<(), AuthError> {
        validate_email(email)?;
        let email = normalize_email(email);
        let now = self.clock.now();

        let confirm = token::mint();
        let unsubscribe = token::mint();
        let subscriber = Subscriber {
            email: email.clone(),
            confirmed: false,
            confirmation_token: Some(OneTimeToken {
                hash: confirm.hash.clone(),
                expires_at: now + Duration::seconds(self.confirm_ttl_secs as i64),
            }),
            unsubscribe_token_hash: unsubscribe.hash.clone(),
            owner_account_id,
            created_at: now,
        };

        match self.store.upsert_pending(subscriber).await? {
            UpsertOutcome::AlreadyConfirmed => {
                info!("subscribe ignored: address already confirmed");
            }
            outcome => {
                debug!("newsletter subscription pending ({outcome:?})");
                let dispatcher = Arc::clone(&self.dispatcher);
                spawn_notify("newsletter confirmation", async move {
                    dispatcher
                        .send_confirmation(&email, &confirm.raw, &unsubscribe.raw)
                        .await
                });
            }
        }
        Ok(())
    }

    /// Consume a confirmation token. Missing, wrong and expired tokens
    /// are indistinguishable.
    pub async fn confirm(&self, raw_token: &str) -> Result<Subscriber, AuthError> {
        if raw_token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let hash = token::digest(raw_token);
        match self.store.confirm(&hash, self.clock.now()).await? {
            Some(subscriber) => {
                info!("newsletter subscription confirmed");
                Ok(subscriber)
            }
            None => {
                info!("newsletter confirmation failed: no live match");
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Remove the subscription behind an unsubscribe capability.
    /// Idempotent: an unknown token is a no-op success, so a stale link
    /// in an old email never errors.
    pub async fn unsubscribe(&self, raw_token: &str) -> Result<(), AuthError> {
        if raw_token.is_empty() {
            return Ok(());
        }
        let hash = token::digest(raw_token);
        if self.store.remove_by_unsubscribe_hash(&hash).await? {
            info!("newsletter subscription removed");
        } else {
            debug!("unsubscribe ignored: no matching subscription");
        }
        Ok(())
    }

    /// Drop unconfirmed subscriptions whose window has passed.
    pub async fn sweep_expired(&self) -> Result<usize, AuthError> {
        let removed = self.store.sweep_expired(self.clock.now()).await?;
        if removed > 0 {
            info!("swept {removed} expired newsletter subscriptions");
        }
        Ok(removed)
    }

    /// Background task running the expiry sweep on an interval.
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.sweep_expired().await {
                    warn!("newsletter sweep failed: {err}");
                }
            }
        })
    }
}

/// In-memory store, keyed by normalized email.
#[derive(Default)]
pub struct MemorySubscriberStore {
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn upsert_pending(&self, subscriber: Subscriber) -> Result<UpsertOutcome, StorageError> {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get_mut(&subscriber.email) {
            Some(existing) if existing.confirmed => Ok(UpsertOutcome::AlreadyConfirmed),
            Some(existing) => {
                existing.confirmation_token = subscriber.confirmation_token;
                existing.unsubscribe_token_hash = subscriber.unsubscribe_token_hash;
                existing.owner_account_id = subscriber.owner_account_id;
                Ok(UpsertOutcome::PendingRefreshed)
            }
            None => {
                subscribers.insert(subscriber.email.clone(), subscriber);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn confirm(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StorageError> {
        let mut subscribers = self.subscribers.write().await;
        let matching = subscribers.values_mut().find(|s| {
            s.confirmation_token
                .as_ref()
                .is_some_and(|t| token::hashes_match(&t.hash, token_hash) && !t.is_expired(now))
        });
        match matching {
            Some(subscriber) => {
                subscriber.confirmed = true;
                subscriber.confirmation_token = None;
                Ok(Some(subscriber.clone()))
            }
            None => Ok(None),
        }
    }

    async fn remove_by_unsubscribe_hash(&self, token_hash: &str) -> Result<bool, StorageError> {
        let mut subscribers = self.subscribers.write().await;
        let email = subscribers
            .values()
            .find(|s| token::hashes_match(&s.unsubscribe_token_hash, token_hash))
            .map(|s| s.email.clone());
        match email {
            Some(email) => {
                subscribers.remove(&email);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|_, s| {
            s.confirmed || s.confirmation_token.as_ref().is_some_and(|t| !t.is_expired(now))
        });
        Ok(before - subscribers.len())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscriber>, StorageError> {
        Ok(self.subscribers.read().await.get(email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::NotifyError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNewsletterDispatcher {
        sent: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    #[async_trait]
    impl NewsletterDispatcher for RecordingNewsletterDispatcher {
        async fn send_confirmation(
            &self,
            email: &str,
            confirm_token: &str,
            unsubscribe_token: &str,
        ) -> Result<(), NotifyError> {
            self.sent.lock().push((
                email.to_string(),
                confirm_token.to_string(),
                unsubscribe_token.to_string(),
            ));
            Ok(())
        }
    }

    struct Fixture {
        service: NewsletterService,
        store: Arc<MemorySubscriberStore>,
        dispatcher: Arc<RecordingNewsletterDispatcher>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemorySubscriberStore::new());
        let dispatcher = Arc::new(RecordingNewsletterDispatcher::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = NewsletterService::new(
            Arc::clone(&store) as Arc<dyn SubscriberStore>,
            Arc::clone(&dispatcher) as Arc<dyn NewsletterDispatcher>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            3600,
        );
        Fixture { service, store, dispatcher, clock }
    }

    async fn sent_tokens(fx: &Fixture) -> (String, String) {
        // The confirmation is dispatched on a spawned task.
        tokio::task::yield_now().await;
        let sent = fx.dispatcher.sent.lock();
        let last = sent.last().cloned().unwrap();
        (last.1, last.2)
    }

    #[tokio::test]
    async fn test_subscribe_confirm_lifecycle() {
        let fx = fixture();
        fx.service.subscribe("Reader@Example.com", None).await.unwrap();
        let (confirm_raw, _) = sent_tokens(&fx).await;

        let pending = fx.store.find_by_email("reader@example.com").await.unwrap().unwrap();
        assert!(!pending.confirmed);

        let confirmed = fx.service.confirm(&confirm_raw).await.unwrap();
        assert!(confirmed.confirmed);
        assert!(confirmed.confirmation_token.is_none());

        // One-shot: a second presentation fails.
        assert!(matches!(
            fx.service.confirm(&confirm_raw).await.unwrap_err(),
            AuthError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn test_expired_confirmation_rejected_and_swept() {
        let fx = fixture();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (confirm_raw, _) = sent_tokens(&fx).await;

        fx.clock.advance(Duration::hours(2));
        assert!(fx.service.confirm(&confirm_raw).await.is_err());

        assert_eq!(fx.service.sweep_expired().await.unwrap(), 1);
        assert!(fx.store.find_by_email("reader@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_spares_confirmed_subscribers() {
        let fx = fixture();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (confirm_raw, _) = sent_tokens(&fx).await;
        fx.service.confirm(&confirm_raw).await.unwrap();

        fx.clock.advance(Duration::days(30));
        assert_eq!(fx.service.sweep_expired().await.unwrap(), 0);
        assert!(fx.store.find_by_email("reader@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resubscribe_refreshes_pending_token() {
        let fx = fixture();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (first_raw, _) = sent_tokens(&fx).await;
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (second_raw, _) = sent_tokens(&fx).await;

        // Only the newest token is valid.
        assert!(fx.service.confirm(&first_raw).await.is_err());
        assert!(fx.service.confirm(&second_raw).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_when_confirmed_is_silent_noop() {
        let fx = fixture();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (confirm_raw, _) = sent_tokens(&fx).await;
        fx.service.confirm(&confirm_raw).await.unwrap();

        fx.dispatcher.sent.lock().clear();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        tokio::task::yield_now().await;
        assert!(fx.dispatcher.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_and_is_idempotent() {
        let fx = fixture();
        fx.service.subscribe("reader@example.com", None).await.unwrap();
        let (_, unsubscribe_raw) = sent_tokens(&fx).await;

        fx.service.unsubscribe(&unsubscribe_raw).await.unwrap();
        assert!(fx.store.find_by_email("reader@example.com").await.unwrap().is_none());

        fx.service.unsubscribe(&unsubscribe_raw).await.unwrap();
        fx.service.unsubscribe("never-issued").await.unwrap();
        fx.service.unsubscribe("").await.unwrap();
    }
}

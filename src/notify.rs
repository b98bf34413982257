//! Notification dispatch boundary.
//!
//! Email transport and templating live outside this subsystem; we only
//! define the dispatcher interface and the fire-and-forget invocation
//! policy: notifications are sent after the state change commits, and
//! their failure is logged, never surfaced to the caller.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Account, DeviceMeta};

#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// Security-relevant events surfaced to the account holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    Login { device: DeviceMeta },
    PasswordChanged,
    PasswordReset,
    EmailRemoved,
}

/// Outbound notification interface, injected into the orchestrator.
/// All calls are advisory; return values exist only so tests can
/// observe outcomes.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_verification(&self, account: &Account, raw_token: &str)
        -> Result<(), NotifyError>;

    async fn send_password_reset(
        &self,
        account: &Account,
        raw_token: &str,
    ) -> Result<(), NotifyError>;

    async fn send_email_change_verification(
        &self,
        account: &Account,
        raw_token: &str,
        target_email: &str,
    ) -> Result<(), NotifyError>;

    async fn send_security_alert(
        &self,
        account: &Account,
        event: SecurityEvent,
    ) -> Result<(), NotifyError>;

    async fn send_welcome(&self, account: &Account) -> Result<(), NotifyError>;
}

/// Spawn a dispatch future without tying it to the caller's control
/// flow. Failures land in the log and nowhere else.
pub fn spawn_notify<F>(what: &'static str, fut: F)
where
    F: Future<Output = Result<(), NotifyError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = fut.await {
            warn!("{what} notification failed: {err}");
        }
    });
}

/// Dispatcher that only logs. Useful for embedding without an email
/// collaborator wired up.
#[derive(Debug, Default, Clone)]
pub struct NullDispatcher;

#[async_trait]
impl NotificationDispatcher for NullDispatcher {
    async fn send_verification(&self, account: &Account, _: &str) -> Result<(), NotifyError> {
        debug!("verification notification suppressed for account {}", account.id);
        Ok(())
    }

    async fn send_password_reset(&self, account: &Account, _: &str) -> Result<(), NotifyError> {
        debug!("password reset notification suppressed for account {}", account.id);
        Ok(())
    }

    async fn send_email_change_verification(
        &self,
        account: &Account,
        _: &str,
        _: &str,
    ) -> Result<(), NotifyError> {
        debug!("email change notification suppressed for account {}", account.id);
        Ok(())
    }

    async fn send_security_alert(
        &self,
        account: &Account,
        event: SecurityEvent,
    ) -> Result<(), NotifyError> {
        debug!("security alert {:?} suppressed for account {}", event, account.id);
        Ok(())
    }

    async fn send_welcome(&self, account: &Account) -> Result<(), NotifyError> {
        debug!("welcome notification suppressed for account {}", account.id);
        Ok(())
    }
}

/// What a recording dispatcher captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    Verification { account_handle: String, raw_token: String },
    PasswordReset { account_handle: String, raw_token: String },
    EmailChange { account_handle: String, raw_token: String, target_email: String },
    SecurityAlert { account_handle: String, event: SecurityEvent },
    Welcome { account_handle: String },
}

/// Test dispatcher that records every send and can be told to fail, to
/// prove that notification faults never fail the primary operation.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }

    fn record(&self, notification: SentNotification) -> Result<(), NotifyError> {
        if *self.fail.lock() {
            return Err(NotifyError("simulated transport failure".to_string()));
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send_verification(
        &self,
        account: &Account,
        raw_token: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::Verification {
            account_handle: account.handle.clone(),
            raw_token: raw_token.to_string(),
        })
    }

    async fn send_password_reset(
        &self,
        account: &Account,
        raw_token: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::PasswordReset {
            account_handle: account.handle.clone(),
            raw_token: raw_token.to_string(),
        })
    }

    async fn send_email_change_verification(
        &self,
        account: &Account,
        raw_token: &str,
        target_email: &str,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::EmailChange {
            account_handle: account.handle.clone(),
            raw_token: raw_token.to_string(),
            target_email: target_email.to_string(),
        })
    }

    async fn send_security_alert(
        &self,
        account: &Account,
        event: SecurityEvent,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::SecurityAlert {
            account_handle: account.handle.clone(),
            event,
        })
    }

    async fn send_welcome(&self, account: &Account) -> Result<(), NotifyError> {
        self.record(SentNotification::Welcome { account_handle: account.handle.clone() })
    }
}

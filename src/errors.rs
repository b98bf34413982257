//! Error types for the account and session subsystem.

use thiserror::Error;

use crate::storage::{DuplicateField, StorageError};

/// Domain error returned by every orchestrator operation.
///
/// Enumeration-sensitive flows never surface `NotFound`; they either
/// return a uniform success shape or collapse to `InvalidToken` /
/// `InvalidCredentials` so callers cannot probe which accounts exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("handle already taken")]
    HandleTaken,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email address not verified")]
    EmailNotVerified,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("acknowledgement required: {0}")]
    AcknowledgementRequired(String),

    #[error("account not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for downstream request handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::WeakPassword(_) => "weak_password",
            Self::HandleTaken => "handle_taken",
            Self::EmailTaken => "email_taken",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailNotVerified => "email_not_verified",
            Self::InvalidToken => "invalid_token",
            Self::AcknowledgementRequired(_) => "acknowledgement_required",
            Self::NotFound => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "server_error",
        }
    }

    /// Coarse classification mirroring the error taxonomy: validation,
    /// conflict, unauthorized, forbidden, not-found or internal.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::WeakPassword(_) => ErrorClass::Validation,
            Self::HandleTaken | Self::EmailTaken => ErrorClass::Conflict,
            Self::InvalidCredentials | Self::EmailNotVerified | Self::InvalidToken => {
                ErrorClass::Unauthorized
            }
            Self::AcknowledgementRequired(_) => ErrorClass::Forbidden,
            Self::NotFound => ErrorClass::NotFound,
            Self::Storage(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }
}

/// Error classification used by the surrounding request layer to pick a
/// transport status. No transport shape is defined here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Conflict,
    Unauthorized,
    Forbidden,
    NotFound,
    Internal,
}

/// Storage faults are translated at the boundary: uniqueness violations
/// become field-specific conflicts (covering races that slip past the
/// pre-checks), everything else is an internal storage error whose
/// detail stays in the logs.
impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate(DuplicateField::Handle) => Self::HandleTaken,
            StorageError::Duplicate(DuplicateField::Email) => Self::EmailTaken,
            StorageError::Duplicate(DuplicateField::SessionToken) => {
                Self::Internal("session token collision".to_string())
            }
            StorageError::NotFound => Self::NotFound,
            StorageError::Backend(detail) => {
                tracing::error!("storage backend failure: {detail}");
                Self::Storage("storage operation failed".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::HandleTaken.error_code(), "handle_taken");
        assert_eq!(AuthError::InvalidToken.error_code(), "invalid_token");
        assert_eq!(
            AuthError::AcknowledgementRequired("x".into()).error_code(),
            "acknowledgement_required"
        );
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(AuthError::EmailTaken.class(), ErrorClass::Conflict);
        assert_eq!(AuthError::InvalidCredentials.class(), ErrorClass::Unauthorized);
        assert_eq!(AuthError::Storage("x".into()).class(), ErrorClass::Internal);
    }

    #[test]
    fn test_duplicate_translation() {
        let err: AuthError = StorageError::Duplicate(DuplicateField::Email).into();
        assert!(matches!(err, AuthError::EmailTaken));
        let err: AuthError = StorageError::Duplicate(DuplicateField::Handle).into();
        assert!(matches!(err, AuthError::HandleTaken));
    }
}

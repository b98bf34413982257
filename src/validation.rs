//! Input shape validation for handles and email addresses.
//!
//! Shape checks only; uniqueness is the repository's concern.

use crate::errors::AuthError;

pub const HANDLE_MIN_LEN: usize = 3;
pub const HANDLE_MAX_LEN: usize = 32;

/// Handles are 3-32 characters of letters, digits, underscore or
/// hyphen, and may not start with a digit.
pub fn validate_handle(handle: &str) -> Result<(), AuthError> {
    if handle.len() < HANDLE_MIN_LEN || handle.len() > HANDLE_MAX_LEN {
        return Err(AuthError::Validation(format!(
            "handle must be {HANDLE_MIN_LEN}-{HANDLE_MAX_LEN} characters"
        )));
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AuthError::Validation(
            "handle may only contain letters, digits, underscore and hyphen".to_string(),
        ));
    }
    if handle.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation("handle may not start with a digit".to_string()));
    }
    Ok(())
}

/// Lightweight email shape check. Deliverability is proven by the
/// verification token, not by parsing.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let shape_ok = email.len() <= 254
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !shape_ok {
        return Err(AuthError::Validation("invalid email address".to_string()));
    }
    Ok(())
}

/// Canonical form used for uniqueness comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

//! Credential and token lifecycle subsystem for a personal finance
//! tracker: account registration and login, refresh-session rotation
//! and revocation, one-time capability tokens (email verification,
//! password reset, email change) and newsletter double opt-in.
//!
//! The request layer, email transport and durable storage are external
//! collaborators; this crate defines their contracts and ships an
//! in-memory repository that verifies the atomicity guarantees the
//! subsystem depends on.

pub mod access;
pub mod clock;
pub mod config;
pub mod errors;
pub mod newsletter;
pub mod notify;
pub mod password;
pub mod service;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;
pub mod validation;

pub use config::AuthConfig;
pub use errors::{AuthError, ErrorClass};
pub use service::AccountService;
pub use types::{Account, AccountView, AuthResponse, LoginRequest, RegisterRequest, SessionTokens};

//! Account persistence abstraction.
//!
//! The repository is an external collaborator in production; its
//! contract is defined here because the subsystem depends on specific
//! atomicity guarantees from it. `MemoryRepository` is the
//! contract-verifying reference implementation.

pub mod memory;
pub mod r#trait;

pub use memory::MemoryRepository;
pub use r#trait::{AccountRepository, SessionRotation};

use thiserror::Error;

/// Which unique field a conflicting write collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Handle,
    Email,
    SessionToken,
}

impl std::fmt::Display for DuplicateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle => write!(f, "handle"),
            Self::Email => write!(f, "email"),
            Self::SessionToken => write!(f, "session token"),
        }
    }
}

/// Storage-layer error. Uniqueness violations are distinguishable so
/// the service layer can translate races into domain conflicts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} already in use")]
    Duplicate(DuplicateField),

    #[error("account not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

//! One-time capability token primitive.
//!
//! A token is a high-entropy URL-safe string handed to the caller
//! exactly once; only its SHA-256 digest is persisted. The same
//! primitive backs email verification, password reset, email change,
//! refresh credentials and newsletter opt-in.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// 256 bits of entropy, comfortably above the 128-bit floor.
pub const TOKEN_BYTES: usize = 32;

/// A freshly minted token: the raw secret (deliver out-of-band, never
/// persist) and the digest to store.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub raw: String,
    pub hash: String,
}

/// Mint a new random token.
pub fn mint() -> MintedToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let raw = URL_SAFE_NO_PAD.encode(bytes);
    let hash = digest(&raw);
    MintedToken { raw, hash }
}

/// Deterministic digest of a raw token, hex-encoded.
pub fn digest(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Constant-time digest comparison.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_is_unique_and_url_safe() {
        let a = mint();
        let b = mint();
        assert_ne!(a.raw, b.raw);
        assert!(a.raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 32 bytes -> 43 base64 characters without padding.
        assert_eq!(a.raw.len(), 43);
    }

    #[test]
    fn test_digest_matches_mint() {
        let minted = mint();
        assert_eq!(digest(&minted.raw), minted.hash);
        assert_ne!(digest("other"), minted.hash);
    }

    #[test]
    fn test_hashes_match() {
        let minted = mint();
        assert!(hashes_match(&minted.hash, &digest(&minted.raw)));
        assert!(!hashes_match(&minted.hash, &digest("guess")));
        assert!(!hashes_match(&minted.hash, "short"));
    }
}

// BlueShare Crypto Primitives
// Constant-time cryptographic primitives shared across BlueShare's core subsystems

//! # Crypto Primitives
//!
//! The lowest layer of the BlueShare core: hashing, HMAC, secure randomness
//! and constant-time comparison. Every other crate in the workspace builds
//! on these four operations and none of them reach past this crate for
//! raw cryptographic material.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand_core::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum CryptoError {
    /// The process CSPRNG is exhausted or unavailable. This is fatal to the
    /// process — callers must never substitute a weaker generator.
    #[error("entropy source exhausted or unavailable: {0}")]
    EntropySourceExhausted(String),
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256 of `msg` under `key`.
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    // `Hmac::new_from_slice` accepts keys of any length (it hashes
    // oversized keys internally), so this cannot fail in practice.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// Draw `n` bytes from the process CSPRNG.
///
/// Never falls back to a weaker generator: a failure to read from the OS
/// entropy source is raised as a fatal [`CryptoError::EntropySourceExhausted`].
pub fn secure_random(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::EntropySourceExhausted(e.to_string()))?;
    Ok(bytes)
}

/// Constant-time comparison.
///
/// Runs in time proportional to `max(a.len(), b.len())` regardless of where
/// (or whether) the slices first differ, and regardless of whether the
/// lengths match — a naive early-exit comparison is treated as a bug.
pub fn ct_equal(a: &[u8], b: &[u8]) -> bool {
    let len_matches = a.len() == b.len();
    let max_len = a.len().max(b.len());
    let mut diff: u8 = 0;
    for i in 0..max_len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    len_matches && diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn test_hmac_deterministic() {
        let a = hmac_sha256(b"key", b"message");
        let b = hmac_sha256(b"key", b"message");
        assert_eq!(a, b);
        let c = hmac_sha256(b"other-key", b"message");
        assert_ne!(a, c);
    }

    #[test]
    fn test_secure_random_is_not_constant() {
        let a = secure_random(32).unwrap();
        let b = secure_random(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ct_equal_basic() {
        assert!(ct_equal(b"abc", b"abc"));
        assert!(!ct_equal(b"abc", b"abd"));
        assert!(!ct_equal(b"abc", b"abcd"));
        assert!(!ct_equal(b"", b"a"));
        assert!(ct_equal(b"", b""));
    }

    proptest::proptest! {
        #[test]
        fn ct_equal_agrees_with_plain_equality(a: Vec<u8>, b: Vec<u8>) {
            proptest::prop_assert_eq!(ct_equal(&a, &b), a == b);
        }
    }
}

// BlueShare Phantom Encoder
// Zero-knowledge identity creation, derivation, proof and persistence

//! # Phantom Identity
//!
//! Implements the "Phantom Encoder" pattern: a device's public handle
//! (`ZeroId`) never discloses the local secret it was built from, a
//! verification token (`ZeroKey`) is always stored apart from it, and
//! purpose-scoped derivations (`derive_zero_id`) are one-way and
//! unlinkable across purposes.
//!
//! Invariants enforced here (see the project's data-model invariants):
//! - **ZK1** a `ZeroId` and its `ZeroKey` are never written to the same path.
//! - **ZK2** `local_secret` passed to [`create_zero_id`] is never persisted.
//! - **ZK3** `derive_zero_id` is one-way: the derived hash does not reveal
//!   the parent hash or the purpose string used to produce it.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use blueshare_crypto::{hmac_sha256, secure_random, sha256, ct_equal, CryptoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Zero-key verification tokens expire after 30 days by default.
pub const DEFAULT_KEY_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

const ZID_VERSION: u8 = 1;
/// `version(1) + reserved(7) + hash(32) + salt(32) + created_at(8)`
const ZID_RECORD_LEN: usize = 1 + 7 + 32 + 32 + 8;
/// `hash(32) + issued_at(8) + expires_at(8)`
const KEY_RECORD_LEN: usize = 32 + 8 + 8;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("entropy source unavailable: {0}")]
    Entropy(#[from] CryptoError),
    #[error("refusing to colocate a ZeroId and ZeroKey at the same artifact path: {0}")]
    KeyCollocation(String),
    #[error("corrupt artifact at {path}: {reason}")]
    CorruptArtifact { path: String, reason: String },
    #[error("I/O error on identity store: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZeroKey expired at {expires_at} (now {now})")]
    KeyExpired { expires_at: u64, now: u64 },
}

/// Process-local, read-only-after-init context for a running BlueShare node.
///
/// `master_key` never leaves the process and is zeroised when the context
/// is dropped. Multiple sessions hold this behind a shared, read-only
/// reference — see `blueshare-core`'s session model.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ZeroContext {
    pub algorithm_tag: u8,
    master_key: [u8; 32],
    #[zeroize(skip)]
    context_salt: [u8; 32],
}

impl ZeroContext {
    /// Create a fresh context, drawing both keys from the CSPRNG.
    pub fn new() -> Result<Self, IdentityError> {
        let master_key = secure_random(32)?;
        let context_salt = secure_random(32)?;
        Ok(Self {
            algorithm_tag: ZID_VERSION,
            master_key: master_key.try_into().expect("secure_random(32) returns 32 bytes"),
            context_salt: context_salt.try_into().expect("secure_random(32) returns 32 bytes"),
        })
    }

    /// Build a context from externally supplied key material (e.g. loaded
    /// from a secrets manager at process start). The bytes are copied in
    /// and the caller's copy remains the caller's responsibility to erase.
    pub fn from_parts(master_key: [u8; 32], context_salt: [u8; 32]) -> Self {
        Self {
            algorithm_tag: ZID_VERSION,
            master_key,
            context_salt,
        }
    }
}

/// A public, pseudonymous handle. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroId {
    pub version: u8,
    pub hash: [u8; 32],
    pub salt: [u8; 32],
    pub created_at: u64,
}

/// A verification token bound to a [`ZeroId`] but persisted separately (ZK1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroKey {
    pub hash: [u8; 32],
    pub issued_at: u64,
    pub expires_at: u64,
}

/// A single-use, 32-byte authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge(pub [u8; 32]);

impl Challenge {
    pub fn generate() -> Result<Self, IdentityError> {
        let bytes = secure_random(32)?;
        Ok(Challenge(bytes.try_into().expect("secure_random(32) returns 32 bytes")))
    }
}

/// A non-interactive proof of possession of a [`ZeroId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub digest: [u8; 32],
    pub challenge: [u8; 32],
    pub created_at: u64,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

/// Allocate a fresh salt and hash `local_secret || salt`. `local_secret`
/// never appears in the returned `ZeroId` or anywhere else (ZK2).
pub fn create_zero_id(_ctx: &ZeroContext, local_secret: &[u8]) -> Result<ZeroId, IdentityError> {
    let salt = secure_random(32)?;
    let mut preimage = Vec::with_capacity(local_secret.len() + salt.len());
    preimage.extend_from_slice(local_secret);
    preimage.extend_from_slice(&salt);
    let hash = sha256(&preimage);
    Ok(ZeroId {
        version: ZID_VERSION,
        hash,
        salt: salt.try_into().expect("secure_random(32) returns 32 bytes"),
        created_at: now_unix(),
    })
}

/// Derive a verification token bound to `zid`, valid for
/// [`DEFAULT_KEY_LIFETIME_SECS`].
pub fn create_zero_key(ctx: &ZeroContext, zid: &ZeroId) -> ZeroKey {
    create_zero_key_with_lifetime(ctx, zid, DEFAULT_KEY_LIFETIME_SECS)
}

/// As [`create_zero_key`], but with a caller-supplied lifetime — the
/// lifetime is policy, not a fixed constant, so callers may override it
/// via configuration.
pub fn create_zero_key_with_lifetime(ctx: &ZeroContext, zid: &ZeroId, lifetime_secs: u64) -> ZeroKey {
    let hash = hmac_sha256(&ctx.master_key, &zid.hash);
    let issued_at = now_unix();
    ZeroKey {
        hash,
        issued_at,
        expires_at: issued_at + lifetime_secs,
    }
}

/// Purpose-scoped, one-way derivation of a new `ZeroId` from `parent`.
///
/// Deterministic in `(ctx.context_salt, parent.hash, purpose)`: the same
/// triple always yields the same hash, but two different purposes yield
/// unlinkable hashes (ZK3) — the derived hash alone cannot be traced back
/// to `parent` without already knowing the context salt and the purpose.
pub fn derive_zero_id(ctx: &ZeroContext, parent: &ZeroId, purpose: &str) -> ZeroId {
    let mut preimage = Vec::with_capacity(parent.hash.len() + purpose.len());
    preimage.extend_from_slice(&parent.hash);
    preimage.extend_from_slice(purpose.as_bytes());
    let hash = hmac_sha256(&ctx.context_salt, &preimage);
    ZeroId {
        version: parent.version,
        hash,
        salt: parent.salt,
        created_at: now_unix(),
    }
}

/// Produce a proof that the holder knows `zid`'s preimage, bound to a
/// fresh `challenge`.
pub fn create_proof(_ctx: &ZeroContext, zid: &ZeroId, challenge: &Challenge) -> Proof {
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(&zid.hash);
    preimage.extend_from_slice(&challenge.0);
    Proof {
        digest: sha256(&preimage),
        challenge: challenge.0,
        created_at: now_unix(),
    }
}

/// Verify `proof` against `zid`. If `key` is supplied, its expiry is
/// checked first — an expired key fails verification outright, regardless
/// of whether the digest itself is valid.
///
/// Runs in time independent of where (or whether) `proof.digest` differs
/// from the expected digest.
pub fn verify_proof(
    _ctx: &ZeroContext,
    proof: &Proof,
    zid: &ZeroId,
    key: Option<&ZeroKey>,
) -> Result<bool, IdentityError> {
    if let Some(key) = key {
        let now = now_unix();
        if now > key.expires_at {
            warn!(expires_at = key.expires_at, now, "zero-key expired, rejecting proof");
            return Err(IdentityError::KeyExpired {
                expires_at: key.expires_at,
                now,
            });
        }
    }

    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(&zid.hash);
    preimage.extend_from_slice(&proof.challenge);
    let expected = sha256(&preimage);
    Ok(ct_equal(&proof.digest, &expected))
}

fn reject_if_collocated(path: &Path, other_record_len: u64) -> Result<(), IdentityError> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() == other_record_len {
            warn!(path = %path.display(), "refusing to colocate ZeroId and ZeroKey at the same path");
            return Err(IdentityError::KeyCollocation(path.display().to_string()));
        }
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("blueshare-identity")
    ));
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Write a fixed-layout `.zid` record. Refuses to overwrite a path that
/// already holds a `.zid.key` record (ZK1).
pub fn save_zero_id(zid: &ZeroId, path: &Path) -> Result<(), IdentityError> {
    reject_if_collocated(path, KEY_RECORD_LEN as u64)?;

    let mut buf = Vec::with_capacity(ZID_RECORD_LEN);
    buf.push(zid.version);
    buf.extend_from_slice(&[0u8; 7]); // reserved
    buf.extend_from_slice(&zid.hash);
    buf.extend_from_slice(&zid.salt);
    buf.extend_from_slice(&zid.created_at.to_le_bytes());
    write_atomic(path, &buf)
}

/// Write a fixed-layout `.zid.key` record. Refuses to overwrite a path
/// that already holds a `.zid` record (ZK1).
pub fn save_zero_key(key: &ZeroKey, path: &Path) -> Result<(), IdentityError> {
    reject_if_collocated(path, ZID_RECORD_LEN as u64)?;

    let mut buf = Vec::with_capacity(KEY_RECORD_LEN);
    buf.extend_from_slice(&key.hash);
    buf.extend_from_slice(&key.issued_at.to_le_bytes());
    buf.extend_from_slice(&key.expires_at.to_le_bytes());
    write_atomic(path, &buf)
}

pub fn load_zero_id(path: &Path) -> Result<ZeroId, IdentityError> {
    let bytes = fs::read(path)?;
    if bytes.len() != ZID_RECORD_LEN {
        return Err(IdentityError::CorruptArtifact {
            path: path.display().to_string(),
            reason: format!("expected {ZID_RECORD_LEN} bytes, found {}", bytes.len()),
        });
    }
    let version = bytes[0];
    if version != ZID_VERSION {
        return Err(IdentityError::CorruptArtifact {
            path: path.display().to_string(),
            reason: format!("unsupported ZeroId version {version}"),
        });
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[8..40]);
    let mut salt = [0u8; 32];
    salt.copy_from_slice(&bytes[40..72]);
    let mut created_at_bytes = [0u8; 8];
    created_at_bytes.copy_from_slice(&bytes[72..80]);

    Ok(ZeroId {
        version,
        hash,
        salt,
        created_at: u64::from_le_bytes(created_at_bytes),
    })
}

pub fn load_zero_key(path: &Path) -> Result<ZeroKey, IdentityError> {
    let bytes = fs::read(path)?;
    if bytes.len() != KEY_RECORD_LEN {
        return Err(IdentityError::CorruptArtifact {
            path: path.display().to_string(),
            reason: format!("expected {KEY_RECORD_LEN} bytes, found {}", bytes.len()),
        });
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[0..32]);
    let mut issued_at_bytes = [0u8; 8];
    issued_at_bytes.copy_from_slice(&bytes[32..40]);
    let mut expires_at_bytes = [0u8; 8];
    expires_at_bytes.copy_from_slice(&bytes[40..48]);

    Ok(ZeroKey {
        hash,
        issued_at: u64::from_le_bytes(issued_at_bytes),
        expires_at: u64::from_le_bytes(expires_at_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn distinct_secrets_give_distinct_salts_and_hashes() {
        let ctx = ZeroContext::new().unwrap();
        let a = create_zero_id(&ctx, b"local-secret").unwrap();
        let b = create_zero_id(&ctx, b"local-secret").unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.salt, b.salt);
    }

    #[test]
    fn derive_is_deterministic_and_purpose_scoped() {
        let ctx = ZeroContext::new().unwrap();
        let root = create_zero_id(&ctx, b"local-secret").unwrap();

        let auth1 = derive_zero_id(&ctx, &root, "authentication");
        let auth2 = derive_zero_id(&ctx, &root, "authentication");
        assert_eq!(auth1.hash, auth2.hash);

        let net = derive_zero_id(&ctx, &root, "network-joining");
        assert_ne!(auth1.hash, net.hash);
        assert_ne!(auth1.hash, root.hash);
    }

    #[test]
    fn proof_round_trips_and_rejects_tampering() {
        let ctx = ZeroContext::new().unwrap();
        let zid = create_zero_id(&ctx, b"local-secret").unwrap();
        let challenge = Challenge::generate().unwrap();
        let proof = create_proof(&ctx, &zid, &challenge);

        assert!(verify_proof(&ctx, &proof, &zid, None).unwrap());

        let mut tampered = proof.clone();
        tampered.digest[0] ^= 0xFF;
        assert!(!verify_proof(&ctx, &tampered, &zid, None).unwrap());
    }

    #[test]
    fn proof_over_one_derived_id_does_not_verify_against_another() {
        let ctx = ZeroContext::new().unwrap();
        let root = create_zero_id(&ctx, b"local-secret").unwrap();
        let auth = derive_zero_id(&ctx, &root, "authentication");
        let net = derive_zero_id(&ctx, &root, "network-joining");

        let challenge = Challenge::generate().unwrap();
        let proof = create_proof(&ctx, &auth, &challenge);
        assert!(verify_proof(&ctx, &proof, &auth, None).unwrap());
        assert!(!verify_proof(&ctx, &proof, &net, None).unwrap());
    }

    #[test]
    fn expired_key_fails_verification() {
        let ctx = ZeroContext::new().unwrap();
        let zid = create_zero_id(&ctx, b"local-secret").unwrap();
        let challenge = Challenge::generate().unwrap();
        let proof = create_proof(&ctx, &zid, &challenge);

        let mut key = create_zero_key(&ctx, &zid);
        key.expires_at = now_unix() - 1;

        let err = verify_proof(&ctx, &proof, &zid, Some(&key)).unwrap_err();
        assert!(matches!(err, IdentityError::KeyExpired { .. }));
    }

    #[test]
    fn save_zero_id_then_save_zero_key_at_same_path_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device.zid");

        let ctx = ZeroContext::new().unwrap();
        let zid = create_zero_id(&ctx, b"local-secret").unwrap();
        let key = create_zero_key(&ctx, &zid);

        save_zero_id(&zid, &path).unwrap();
        let err = save_zero_key(&key, &path).unwrap_err();
        assert!(matches!(err, IdentityError::KeyCollocation(_)));
    }

    #[test]
    fn save_and_load_round_trip_at_distinct_paths() {
        let dir = tempdir().unwrap();
        let zid_path = dir.path().join("device.zid");
        let key_path = dir.path().join("device.zid.key");

        let ctx = ZeroContext::new().unwrap();
        let zid = create_zero_id(&ctx, b"local-secret").unwrap();
        let key = create_zero_key(&ctx, &zid);

        save_zero_id(&zid, &zid_path).unwrap();
        save_zero_key(&key, &key_path).unwrap();

        let loaded_zid = load_zero_id(&zid_path).unwrap();
        let loaded_key = load_zero_key(&key_path).unwrap();
        assert_eq!(loaded_zid, zid);
        assert_eq!(loaded_key, key);
    }

    #[test]
    fn load_rejects_corrupt_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.zid");
        fs::write(&path, b"too short").unwrap();
        let err = load_zero_id(&path).unwrap_err();
        assert!(matches!(err, IdentityError::CorruptArtifact { .. }));
    }
}

//! SHA-256 content hashes and archive integrity verification.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Errors raised while checking archive integrity.
#[derive(Error, Debug)]
pub enum IntegrityError {
    /// The archive digest does not match the declared content hash.
    #[error("checksum verification failed: expected sha256 {expected}, got {actual}")]
    Mismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// A hash string is not 64 hex characters.
    #[error("invalid sha256 '{value}': {reason}")]
    InvalidHash { value: String, reason: &'static str },
}

/// A 256-bit SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct ContentHash([u8; DIGEST_LEN]);

impl ContentHash {
    /// Parse a digest from 64 hex characters (either case).
    pub fn from_hex(value: &str) -> Result<Self, IntegrityError> {
        if value.len() != DIGEST_LEN * 2 {
            return Err(IntegrityError::InvalidHash {
                value: value.to_string(),
                reason: "expected exactly 64 hex characters",
            });
        }

        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| IntegrityError::InvalidHash {
            value: value.to_string(),
            reason: "contains non-hex characters",
        })?;

        Ok(Self(bytes))
    }

    /// Hash an in-memory buffer.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// Check that `data` hashes to `expected`.
///
/// This is the gate in front of every install: nothing may be unpacked or
/// placed from `data` unless this returns `Ok`.
pub fn verify_integrity(data: &[u8], expected: &ContentHash) -> Result<(), IntegrityError> {
    let actual = ContentHash::compute(data);
    if actual.as_bytes() != expected.as_bytes() {
        return Err(IntegrityError::Mismatch {
            expected: *expected,
            actual,
        });
    }
    Ok(())
}

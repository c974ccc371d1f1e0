//! State Hashing
//!
//! Two hash functions with two jobs:
//! - SHA-256 digests of escrow state, used by tests and journal replay to
//!   compare whole-store snapshots cheaply.
//! - keccak-256, used for address derivation and the settlement message
//!   (the signing scheme's native hash).

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Digest output type (256 bits / 32 bytes)
pub type StateDigest = [u8; 32];

/// Compute keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Deterministic hasher for escrow state.
///
/// Wraps SHA-256 with helpers for the crate's primitives.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for escrow store snapshots.
    pub fn for_store() -> Self {
        Self::new(b"CHESS_WAGER_STORE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u64 value (big-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_be_bytes());
    }

    /// Update with a u128 value (big-endian).
    #[inline]
    pub fn update_u128(&mut self, value: u128) {
        self.hasher.update(value.to_be_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> StateDigest {
        self.hasher.finalize().into()
    }
}

/// Compute a simple SHA-256 digest of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> StateDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// =============================================================================
// TESTS
// =============================================================================

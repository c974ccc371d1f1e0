//! Local Loss Signing
//!
//! Produces settlement proofs from a locally-held secret key. Production
//! deployments sign through an external wallet; this signer backs the demo
//! binary and tests, mirroring the two-accounts-on-one-machine flow the
//! original client was built around.

use k256::ecdsa::SigningKey;
use thiserror::Error;

use crate::core::identity::Address;
use crate::escrow::registry::MatchId;
use crate::settlement::message::signed_digest;
use crate::settlement::verify::address_of;
use crate::SIGNATURE_LEN;

/// Errors constructing a signer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// The secret bytes are not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,
}

/// A participant-side signing capability.
pub struct LossSigner {
    key: SigningKey,
    address: Address,
}

impl LossSigner {
    /// Build from 32 raw secret-key bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(secret).map_err(|_| SignerError::InvalidSecretKey)?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// The address this signer's proofs recover to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign the canonical loss message for `match_id`.
    ///
    /// Returns a 65-byte `r || s || v` proof with `v` in {27, 28}, the
    /// encoding external wallets produce.
    pub fn sign_loss(&self, match_id: MatchId) -> [u8; SIGNATURE_LEN] {
        let digest = signed_digest(match_id);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .expect("signing a 32-byte digest with a valid key cannot fail");

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        out
    }
}

impl std::fmt::Debug for LossSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("LossSigner")
            .field("address", &self.address)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_secrets_distinct_addresses() {
        let a = LossSigner::from_secret_bytes(&[1; 32]).unwrap();
        let b = LossSigner::from_secret_bytes(&[2; 32]).unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_zero_secret_rejected() {
        // Zero is not a valid scalar.
        assert_eq!(
            LossSigner::from_secret_bytes(&[0; 32]).unwrap_err(),
            SignerError::InvalidSecretKey
        );
    }

    #[test]
    fn test_signature_shape() {
        let s = LossSigner::from_secret_bytes(&[7; 32]).unwrap();
        let sig = s.sign_loss(MatchId::new(3));
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(sig[64] == 27 || sig[64] == 28);
    }

    #[test]
    fn test_debug_hides_key() {
        let s = LossSigner::from_secret_bytes(&[9; 32]).unwrap();
        let text = format!("{s:?}");
        assert!(text.contains("address"));
        assert!(!text.contains("key"));
    }
}

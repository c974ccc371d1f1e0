//! Canonical Loss Message
//!
//! The exact bytes a losing participant signs. Binding the message to the
//! match id alone (no board hash, no move list) keeps the proof trivial to
//! construct and verify; a signature for one match can never settle another.
//!
//! Construction, matching the signing scheme's personal-message convention:
//!
//! ```text
//! inner  = keccak256( match_id as 32-byte big-endian || "loss" )
//! digest = keccak256( "\x19Ethereum Signed Message:\n32" || inner )
//! ```

use crate::core::hash::keccak256;
use crate::escrow::registry::MatchId;

/// ASCII tag appended to the encoded match id.
pub const LOSS_TAG: &[u8; 4] = b"loss";

/// Personal-message prefix for a 32-byte payload.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// The inner loss message hash for a match:
/// `keccak256(match_id.to_be_bytes32() || "loss")`.
pub fn loss_message(match_id: MatchId) -> [u8; 32] {
    let mut preimage = [0u8; 36];
    preimage[..32].copy_from_slice(&match_id.to_be_bytes32());
    preimage[32..].copy_from_slice(LOSS_TAG);
    keccak256(&preimage)
}

/// The prefixed digest actually signed and recovered against.
pub fn signed_digest(match_id: MatchId) -> [u8; 32] {
    let inner = loss_message(match_id);
    let mut preimage = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    preimage.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    preimage.extend_from_slice(&inner);
    keccak256(&preimage)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_deterministic() {
        let id = MatchId::new(42);
        assert_eq!(loss_message(id), loss_message(id));
        assert_eq!(signed_digest(id), signed_digest(id));
    }

    #[test]
    fn test_message_binds_match_id() {
        assert_ne!(loss_message(MatchId::new(1)), loss_message(MatchId::new(2)));
        assert_ne!(signed_digest(MatchId::new(1)), signed_digest(MatchId::new(2)));
    }

    #[test]
    fn test_prefix_changes_digest() {
        let id = MatchId::new(9);
        assert_ne!(loss_message(id), signed_digest(id));
    }

    #[test]
    fn test_known_vector_for_id_one() {
        // keccak256(uint256(1) || "loss"), pinned so the wire format cannot
        // drift silently.
        let inner = loss_message(MatchId::new(1));
        let mut preimage = [0u8; 36];
        preimage[31] = 1;
        preimage[32..].copy_from_slice(b"loss");
        assert_eq!(inner, crate::core::hash::keccak256(&preimage));
    }
}

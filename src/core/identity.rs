//! Participant Identities
//!
//! 20-byte addresses in the style of an externally-owned account: the
//! trailing 20 bytes of the keccak-256 hash of an uncompressed secp256k1
//! public key. Formatted as 0x-prefixed lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::core::hash::keccak256;

/// A participant identity (address).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Never a valid participant.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive an address from a 64-byte uncompressed public key body
    /// (the X || Y coordinates, without the 0x04 prefix byte).
    pub fn from_public_key(pubkey_xy: &[u8; 64]) -> Self {
        let digest = keccak256(pubkey_xy);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Address parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    /// Input is not 20 bytes of hex (with or without 0x prefix).
    #[error("address must be 40 hex characters")]
    BadLength,

    /// Input contains non-hex characters.
    #[error("invalid hex: {0}")]
    BadHex(String),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        if stripped.len() != 40 {
            return Err(AddressParseError::BadLength);
        }
        let bytes = hex::decode(stripped).map_err(|e| AddressParseError::BadHex(e.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
            if bytes.len() != 20 {
                return Err(de::Error::custom("address must be 20 bytes"));
            }
            let mut out = [0u8; 20];
            out.copy_from_slice(&bytes);
            Ok(Self(out))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::new([0xab; 20]);
        let text = addr.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 42);

        let parsed: Address = text.parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_address_parse_without_prefix() {
        let addr = Address::new([0x11; 20]);
        let bare = hex::encode(addr.0);
        let parsed: Address = bare.parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_address_parse_rejects_bad_input() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::BadLength)
        ));
        let not_hex = "zz".repeat(20);
        assert!(matches!(
            not_hex.parse::<Address>(),
            Err(AddressParseError::BadHex(_))
        ));
    }

    #[test]
    fn test_address_ordering() {
        let a = Address::new([0; 20]);
        let b = Address::new([1; 20]);
        assert!(a < b);
        assert!(a.is_zero());
        assert!(!b.is_zero());
    }

    #[test]
    fn test_address_json_roundtrip() {
        let addr = Address::new([0x42; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));

        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_from_public_key_is_deterministic() {
        let key = [7u8; 64];
        let a = Address::from_public_key(&key);
        let b = Address::from_public_key(&key);
        assert_eq!(a, b);
        assert!(!a.is_zero());

        let other = Address::from_public_key(&[8u8; 64]);
        assert_ne!(a, other);
    }
}

//! Money Arithmetic
//!
//! Stake amounts in atto-units (10^-18 of the display unit), matching the
//! resolution of the settlement chains this escrow fronts. All arithmetic
//! is checked; balances can never go negative or wrap.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Atto-units per display unit.
pub const ATTO_PER_UNIT: u128 = 1_000_000_000_000_000_000;

/// A non-negative amount of funds in atto-units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    /// Zero funds.
    pub const ZERO: Amount = Amount(0);

    /// Create from raw atto-units.
    pub const fn atto(value: u128) -> Self {
        Self(value)
    }

    /// Create from whole display units.
    pub const fn units(value: u64) -> Self {
        Self(value as u128 * ATTO_PER_UNIT)
    }

    /// Raw atto-unit value.
    pub const fn as_atto(&self) -> u128 {
        self.0
    }

    /// Check for zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Checked doubling (the pot of a two-sided match).
    pub fn checked_double(self) -> Option<Amount> {
        self.0.checked_mul(2).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ATTO_PER_UNIT;
        let frac = self.0 % ATTO_PER_UNIT;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:018}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

// Serialized as a decimal string of atto-units: u128 does not survive JSON
// number parsing in most consumers.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let value: u128 = s.parse().map_err(de::Error::custom)?;
            Ok(Amount(value))
        } else {
            Ok(Amount(u128::deserialize(deserializer)?))
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
    fn test_units_and_atto_agree() {
        assert_eq!(Amount::units(1), Amount::atto(ATTO_PER_UNIT));
        assert_eq!(Amount::units(0), Amount::ZERO);
    }

    #[test]
    fn test_checked_arithmetic() {
        let one = Amount::units(1);
        let two = Amount::units(2);

        assert_eq!(one.checked_add(one), Some(two));
        assert_eq!(two.checked_sub(one), Some(one));
        assert_eq!(one.checked_sub(two), None);
        assert_eq!(one.checked_double(), Some(two));
        assert_eq!(Amount::atto(u128::MAX).checked_add(one), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::units(3).to_string(), "3");
        assert_eq!(Amount::atto(ATTO_PER_UNIT / 2).to_string(), "0.5");
        assert_eq!(Amount::atto(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn test_json_roundtrip_as_string() {
        let amount = Amount::atto(123_456_789_000_000_000_000_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"123456789000000000000000\"");

        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}

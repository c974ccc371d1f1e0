//! Shared primitives.
//!
//! Identity, money, and hashing types used by every other layer. Everything
//! here is plain data with deterministic encodings.

pub mod amount;
pub mod hash;
pub mod identity;

// Re-export core types
pub use amount::Amount;
pub use hash::{keccak256, StateDigest, StateHasher};
pub use identity::Address;

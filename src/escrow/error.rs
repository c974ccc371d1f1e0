//! Error Taxonomy
//!
//! Every rejected transition surfaces one of these variants to its caller;
//! nothing is swallowed inside the engine. The taxonomy groups variants by
//! what a caller can do about them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by escrow operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowError {
    /// The joining stake does not equal the match's stake.
    #[error("stake does not match the wager set at creation")]
    StakeMismatch,

    /// A participant attempted to join their own match.
    #[error("cannot join your own match")]
    SelfJoin,

    /// The claimed loser is not a participant of the match.
    #[error("claimed loser is not a participant")]
    UnknownParty,

    /// No match with the given id exists.
    #[error("match not found")]
    NotFound,

    /// The signature is malformed or does not recover to the claimed loser.
    #[error("invalid signature")]
    InvalidSignature,

    /// The payer's free balance cannot cover the amount.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// The match holds no escrowed funds to release.
    #[error("nothing to release")]
    NothingToRelease,

    /// The operation requires an `Open` match.
    #[error("match is not open")]
    NotOpen,

    /// The operation requires an `Active` match.
    #[error("match is not active")]
    NotActive,
}

/// Coarse classification of an [`EscrowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retryable with corrected arguments.
    Caller,
    /// Failed authorization; retryable only with a different, valid proof.
    Authorization,
    /// Funds constraint; no partial movement occurred.
    Resource,
    /// Match is not in the required lifecycle state; not retryable without
    /// an out-of-band transition.
    State,
}

impl EscrowError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EscrowError::StakeMismatch
            | EscrowError::SelfJoin
            | EscrowError::UnknownParty
            | EscrowError::NotFound => ErrorKind::Caller,
            EscrowError::InvalidSignature => ErrorKind::Authorization,
            EscrowError::InsufficientFunds | EscrowError::NothingToRelease => ErrorKind::Resource,
            EscrowError::NotOpen | EscrowError::NotActive => ErrorKind::State,
        }
    }

    /// Whether resubmitting the same call with corrected input can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Caller | ErrorKind::Authorization)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EscrowError::StakeMismatch.kind(), ErrorKind::Caller);
        assert_eq!(EscrowError::NotFound.kind(), ErrorKind::Caller);
        assert_eq!(
            EscrowError::InvalidSignature.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(EscrowError::InsufficientFunds.kind(), ErrorKind::Resource);
        assert_eq!(EscrowError::NotActive.kind(), ErrorKind::State);
    }

    #[test]
    fn test_state_errors_not_retryable() {
        assert!(!EscrowError::NotOpen.is_retryable());
        assert!(!EscrowError::NotActive.is_retryable());
        assert!(EscrowError::SelfJoin.is_retryable());
    }
}

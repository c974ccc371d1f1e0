//! Proof-of-Loss Settlement
//!
//! The cryptographic authorization check at the heart of the protocol. A
//! match settles when someone presents a signature by which the losing
//! participant signed the canonical loss message for that match id — and
//! nothing else. The signature attests to an outcome, not to a move
//! sequence; game adjudication never crosses this boundary.

pub mod message;
pub mod signer;
pub mod verify;

// Re-export key items
pub use message::{loss_message, signed_digest, LOSS_TAG, PERSONAL_MESSAGE_PREFIX};
pub use signer::LossSigner;
pub use verify::{recover_loss_signer, SignatureError};

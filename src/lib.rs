//! # Chess Wager Escrow Server
//!
//! Trustless escrow and proof-of-loss settlement for two-party chess wagers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CHESS WAGER SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── identity.rs - 20-byte addresses, hex codec              │
//! │  ├── amount.rs   - Atto-unit money arithmetic                │
//! │  └── hash.rs     - SHA-256 state digests, keccak-256         │
//! │                                                              │
//! │  escrow/         - Wager lifecycle (deterministic)           │
//! │  ├── ledger.rs   - Stake custody and balances                │
//! │  ├── registry.rs - Match records and state transitions       │
//! │  ├── engine.rs   - Lifecycle state machine                   │
//! │  ├── events.rs   - Transition broadcast channel              │
//! │  ├── journal.rs  - Append-only transition log                │
//! │  └── error.rs    - Error taxonomy                            │
//! │                                                              │
//! │  settlement/     - Proof-of-loss verification                │
//! │  ├── message.rs  - Canonical loss message                    │
//! │  ├── verify.rs   - Signature recovery                        │
//! │  └── signer.rs   - Local signing (dev/test)                  │
//! │                                                              │
//! │  network/        - Service surface (non-deterministic)       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Model
//!
//! The escrow never adjudicates chess. Game play happens off the custody
//! boundary; the only artifact the core verifies is a secp256k1 signature
//! by which the *losing* participant authorizes the payout. Whoever holds a
//! valid loser signature for a match can trigger settlement — security rests
//! on signature unforgeability, not on caller identity.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod escrow;
pub mod network;
pub mod settlement;

// Re-export commonly used types
pub use crate::core::amount::Amount;
pub use crate::core::identity::Address;
pub use escrow::engine::{EscrowEngine, EscrowStore};
pub use escrow::error::{ErrorKind, EscrowError};
pub use escrow::events::{EventChannel, MatchEvent, MatchEventData};
pub use escrow::registry::{Match, MatchId, MatchState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length in bytes of a settlement proof signature (`r || s || v`).
pub const SIGNATURE_LEN: usize = 65;

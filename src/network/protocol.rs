//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with optional binary (bincode) for production.

use serde::{Deserialize, Serialize};

use crate::core::amount::Amount;
use crate::core::identity::Address;
use crate::escrow::error::EscrowError;
use crate::escrow::events::MatchEvent;
use crate::escrow::registry::{Match, MatchId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Introduce the connection's wallet address. Required before any
    /// operation that spends from a balance.
    Hello {
        /// The connection's declared address.
        address: Address,
    },

    /// Create a match, escrowing `stake` from the introduced address.
    CreateMatch {
        /// Stake each side must put up.
        stake: Amount,
    },

    /// Join an open match with the exact matching stake.
    JoinMatch {
        /// Match to join.
        match_id: MatchId,
        /// Must equal the match's stake.
        stake: Amount,
    },

    /// Submit a proof of loss to settle a match.
    ///
    /// Needs no introduction: the proof itself is the entire authorization.
    SubmitClaim {
        /// Match to settle.
        match_id: MatchId,
        /// The participant asserted to have lost.
        claimed_loser: Address,
        /// 65-byte signature, hex encoded (0x prefix optional).
        signature: String,
    },

    /// Abort a match the introduced address participates in.
    VoidMatch {
        /// Match to abort.
        match_id: MatchId,
    },

    /// Read a match snapshot. Needs no introduction.
    GetMatch {
        /// Match to read.
        match_id: MatchId,
    },

    /// Read the introduced address's free balance.
    GetBalance,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Introduction accepted.
    Welcome {
        /// The address now bound to this connection.
        address: Address,
        /// Its free balance (after any dev faucet credit).
        balance: Amount,
        /// Server version.
        server_version: String,
    },

    /// A match was created for this connection.
    MatchCreated {
        /// The new match's id.
        match_id: MatchId,
        /// Snapshot right after creation.
        snapshot: Match,
    },

    /// Snapshot of a match's latest committed state.
    MatchSnapshot {
        /// The snapshot.
        snapshot: Match,
    },

    /// A claim was verified and the match settled.
    ClaimAccepted {
        /// The settled match.
        match_id: MatchId,
        /// Winner paid.
        winner: Address,
        /// Pot released.
        amount: Amount,
    },

    /// A match was aborted.
    MatchVoided {
        /// The voided match.
        match_id: MatchId,
        /// Total refunded.
        refunded: Amount,
    },

    /// Free balance of the introduced address.
    Balance {
        /// The introduced address.
        address: Address,
        /// Its free balance.
        balance: Amount,
    },

    /// A lifecycle event, fanned out to every connection.
    ///
    /// Delivery is best-effort and may repeat; key state off
    /// `GetMatch`, not off events.
    Event(MatchEvent),

    /// An operation was rejected.
    Error(ServerErrorMessage),

    /// Ping reply.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock millis.
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerErrorMessage {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Stake did not match the wager.
    StakeMismatch,
    /// Joining one's own match.
    SelfJoin,
    /// Claimed loser is not a participant.
    UnknownParty,
    /// Unknown match id.
    NotFound,
    /// Proof rejected.
    InvalidSignature,
    /// Balance cannot cover the stake.
    InsufficientFunds,
    /// No escrowed funds to move.
    NothingToRelease,
    /// Match is not open.
    NotOpen,
    /// Match is not active.
    NotActive,
    /// Operation requires a `Hello` first.
    NotIntroduced,
    /// Message was not understood.
    InvalidRequest,
}

impl From<EscrowError> for ErrorCode {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::StakeMismatch => ErrorCode::StakeMismatch,
            EscrowError::SelfJoin => ErrorCode::SelfJoin,
            EscrowError::UnknownParty => ErrorCode::UnknownParty,
            EscrowError::NotFound => ErrorCode::NotFound,
            EscrowError::InvalidSignature => ErrorCode::InvalidSignature,
            EscrowError::InsufficientFunds => ErrorCode::InsufficientFunds,
            EscrowError::NothingToRelease => ErrorCode::NothingToRelease,
            EscrowError::NotOpen => ErrorCode::NotOpen,
            EscrowError::NotActive => ErrorCode::NotActive,
        }
    }
}

impl ServerMessage {
    /// Build an error reply from an escrow rejection.
    pub fn rejection(err: EscrowError) -> Self {
        ServerMessage::Error(ServerErrorMessage {
            code: err.into(),
            message: err.to_string(),
        })
    }
}

/// Decode a hex signature field (0x prefix optional).
///
/// Any decode failure is the caller's `InvalidSignature`: the engine
/// accepts arbitrary bytes and rejects uniformly, and so does the wire
/// layer.
pub fn decode_signature(hex_sig: &str) -> Option<Vec<u8>> {
    let stripped = hex_sig.strip_prefix("0x").unwrap_or(hex_sig);
    hex::decode(stripped).ok()
}

// =============================================================================
// SERIALIZATION
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// TESTS
// =============================================================================

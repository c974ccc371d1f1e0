//! Match Registry
//!
//! Identity and state bookkeeping for matches — who plays, for how much,
//! and where in the lifecycle the match stands. Holds no funds.
//!
//! State transitions are guarded here; the engine composes them with ledger
//! movements atomically.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::amount::Amount;
use crate::core::hash::{StateDigest, StateHasher};
use crate::core::identity::Address;
use crate::escrow::error::EscrowError;

/// Unique match identifier, monotonically allocated and never reused.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MatchId(u64);

impl MatchId {
    /// Create from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Fixed-width 32-byte big-endian encoding (uint256-style), as used in
    /// the settlement message.
    pub fn to_be_bytes32(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&self.0.to_be_bytes());
        out
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a match.
///
/// `Open → Active → Settled` is the happy path; `Void` is the abort path.
/// `Settled` and `Void` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    /// Created, waiting for a second player.
    #[default]
    Open,
    /// Both stakes escrowed, game in progress off-core.
    Active,
    /// Pot released to the winner. Terminal.
    Settled,
    /// Aborted, stakes returned to their payers. Terminal.
    Void,
}

impl MatchState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchState::Settled | MatchState::Void)
    }
}

/// A single wagering session between two participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Unique identifier.
    pub id: MatchId,
    /// Creator; plays white in the original client.
    pub player_one: Address,
    /// Opponent; absent until joined.
    pub player_two: Option<Address>,
    /// Stake each side must escrow. Immutable after creation.
    pub stake: Amount,
    /// Lifecycle state.
    pub state: MatchState,
    /// Winner; `Some` if and only if `state == Settled`.
    pub winner: Option<Address>,
    /// When the match was created.
    pub created_at: DateTime<Utc>,
    /// When the match last transitioned.
    pub updated_at: DateTime<Utc>,
}

impl Match {
    /// Whether `who` is one of the match's participants.
    pub fn is_participant(&self, who: &Address) -> bool {
        *who == self.player_one || self.player_two.as_ref() == Some(who)
    }

    /// The participant opposite `who`, if `who` is a participant of a full
    /// match.
    pub fn opponent_of(&self, who: &Address) -> Option<Address> {
        let two = self.player_two?;
        if *who == self.player_one {
            Some(two)
        } else if *who == two {
            Some(self.player_one)
        } else {
            None
        }
    }

    /// Fold this match's protocol-relevant fields into a digest.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.id.as_u64());
        hasher.update_bytes(self.player_one.as_bytes());
        match &self.player_two {
            Some(p2) => {
                hasher.update_bool(true);
                hasher.update_bytes(p2.as_bytes());
            }
            None => hasher.update_bool(false),
        }
        hasher.update_u128(self.stake.as_atto());
        hasher.update_u8(match self.state {
            MatchState::Open => 0,
            MatchState::Active => 1,
            MatchState::Settled => 2,
            MatchState::Void => 3,
        });
        match &self.winner {
            Some(w) => {
                hasher.update_bool(true);
                hasher.update_bytes(w.as_bytes());
            }
            None => hasher.update_bool(false),
        }
    }
}

/// All match records, keyed by id.
#[derive(Clone, Debug)]
pub struct MatchRegistry {
    matches: BTreeMap<MatchId, Match>,
    next_id: u64,
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchRegistry {
    /// Create an empty registry. Ids start at 1.
    pub fn new() -> Self {
        Self {
            matches: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a fresh id and store a new `Open` match.
    pub fn create(&mut self, creator: Address, stake: Amount) -> MatchId {
        let id = MatchId::new(self.next_id);
        self.next_id += 1;

        let now = Utc::now();
        self.matches.insert(
            id,
            Match {
                id,
                player_one: creator,
                player_two: None,
                stake,
                state: MatchState::Open,
                winner: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Set the second player and transition `Open → Active`.
    pub fn join(&mut self, match_id: MatchId, joiner: Address) -> Result<(), EscrowError> {
        let m = self
            .matches
            .get_mut(&match_id)
            .ok_or(EscrowError::NotFound)?;

        if m.state != MatchState::Open {
            return Err(EscrowError::NotOpen);
        }
        if joiner == m.player_one {
            return Err(EscrowError::SelfJoin);
        }

        m.player_two = Some(joiner);
        m.state = MatchState::Active;
        m.updated_at = Utc::now();
        Ok(())
    }

    /// Record the winner and transition `Active → Settled`.
    pub fn settle(&mut self, match_id: MatchId, winner: Address) -> Result<(), EscrowError> {
        let m = self
            .matches
            .get_mut(&match_id)
            .ok_or(EscrowError::NotFound)?;

        if m.state != MatchState::Active {
            return Err(EscrowError::NotActive);
        }

        m.winner = Some(winner);
        m.state = MatchState::Settled;
        m.updated_at = Utc::now();
        Ok(())
    }

    /// Transition an `Open` or `Active` match to `Void` (abort path).
    pub fn void(&mut self, match_id: MatchId) -> Result<(), EscrowError> {
        let m = self
            .matches
            .get_mut(&match_id)
            .ok_or(EscrowError::NotFound)?;

        if m.state.is_terminal() {
            return Err(EscrowError::NotActive);
        }

        m.state = MatchState::Void;
        m.updated_at = Utc::now();
        Ok(())
    }

    /// Snapshot of the latest committed state of a match.
    pub fn read(&self, match_id: MatchId) -> Result<Match, EscrowError> {
        self.matches
            .get(&match_id)
            .cloned()
            .ok_or(EscrowError::NotFound)
    }

    /// Number of matches ever created.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Whether no match has been created yet.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// All known match ids, ascending.
    pub fn ids(&self) -> Vec<MatchId> {
        self.matches.keys().copied().collect()
    }

    /// Fold this registry's state into a digest.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.next_id);
        for m in self.matches.values() {
            m.hash_into(hasher);
        }
    }

    /// Digest of the registry alone.
    pub fn digest(&self) -> StateDigest {
        let mut hasher = StateHasher::new(b"CHESS_WAGER_REGISTRY_V1");
        self.hash_into(&mut hasher);
        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================

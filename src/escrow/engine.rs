//! Match Lifecycle State Machine
//!
//! Orchestrates creation, joining, settlement and abort over the stake
//! ledger and match registry. The engine owns its store outright — there
//! are no ambient globals — and every operation takes `&mut self`, so a
//! single writer and a total order over transitions are enforced by
//! construction.
//!
//! Every operation validates completely before mutating anything; the
//! commit sequence itself cannot fail. A rejected transition therefore
//! mutates nothing, and a committed one updates ledger and registry
//! together.

use std::io;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::core::amount::Amount;
use crate::core::hash::{StateDigest, StateHasher};
use crate::core::identity::Address;
use crate::escrow::error::EscrowError;
use crate::escrow::events::{EventChannel, MatchEvent, MatchEventData};
use crate::escrow::journal::{JournalWriter, TransitionOp};
use crate::escrow::ledger::StakeLedger;
use crate::escrow::registry::{Match, MatchId, MatchRegistry, MatchState};
use crate::settlement::verify::recover_loss_signer;

/// The escrow's entire mutable state: funds custody plus match records.
///
/// Passed into the engine at construction and mutated only through it.
#[derive(Clone, Debug, Default)]
pub struct EscrowStore {
    /// Funds custody.
    pub ledger: StakeLedger,
    /// Match records.
    pub registry: MatchRegistry,
}

impl EscrowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of the full store, for snapshot comparison and journal
    /// replay verification. Timestamps are excluded; two stores that agree
    /// on every protocol-relevant field agree on their digest.
    pub fn digest(&self) -> StateDigest {
        let mut hasher = StateHasher::for_store();
        self.ledger.hash_into(&mut hasher);
        self.registry.hash_into(&mut hasher);
        hasher.finalize()
    }
}

/// The lifecycle state machine.
pub struct EscrowEngine {
    store: EscrowStore,
    events: EventChannel,
    journal: Option<JournalWriter<Box<dyn io::Write + Send + Sync>>>,
}

impl EscrowEngine {
    /// Create an engine over an owned store.
    pub fn new(store: EscrowStore) -> Self {
        Self {
            store,
            events: EventChannel::default(),
            journal: None,
        }
    }

    /// Create an engine that appends every committed transition to
    /// `writer`.
    ///
    /// The journal is durability bookkeeping, not part of the transition:
    /// an append failure is logged and the committed state stands.
    pub fn with_journal(store: EscrowStore, writer: Box<dyn io::Write + Send + Sync>) -> Self {
        Self {
            store,
            events: EventChannel::default(),
            journal: Some(JournalWriter::new(writer)),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.events.subscribe()
    }

    /// Read-only view of the store.
    pub fn store(&self) -> &EscrowStore {
        &self.store
    }

    // =========================================================================
    // Funding
    // =========================================================================

    /// Credit an account's free balance.
    pub fn deposit(&mut self, account: Address, amount: Amount) {
        self.store.ledger.deposit(account, amount);
        self.record(TransitionOp::Deposited { account, amount });
        debug!(%account, %amount, "deposit credited");
    }

    /// Free balance of an account.
    pub fn available(&self, account: &Address) -> Amount {
        self.store.ledger.available(account)
    }

    /// Pot currently held for a match.
    pub fn held(&self, match_id: MatchId) -> Amount {
        self.store.ledger.held(match_id)
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Create a match: escrow the creator's stake and register an `Open`
    /// match.
    pub fn create_match(
        &mut self,
        creator: Address,
        stake: Amount,
    ) -> Result<MatchId, EscrowError> {
        // A wager of nothing is not a wager.
        if stake.is_zero() {
            return Err(EscrowError::StakeMismatch);
        }
        if !self.store.ledger.can_cover(&creator, stake) {
            return Err(EscrowError::InsufficientFunds);
        }

        // Commit.
        let match_id = self.store.registry.create(creator, stake);
        self.store
            .ledger
            .escrow(match_id, creator, stake)
            .expect("escrow cannot fail after the cover check");

        self.record(TransitionOp::Created {
            match_id,
            creator,
            stake,
        });
        self.events.emit(MatchEventData::Created {
            match_id,
            creator,
            stake,
        });
        info!(%match_id, %creator, %stake, "match created");
        Ok(match_id)
    }

    /// Join a match: escrow the joiner's matching stake and activate.
    pub fn join_match(
        &mut self,
        match_id: MatchId,
        joiner: Address,
        stake: Amount,
    ) -> Result<(), EscrowError> {
        let m = self.store.registry.read(match_id)?;
        if m.state != MatchState::Open {
            return Err(EscrowError::NotOpen);
        }
        if joiner == m.player_one {
            return Err(EscrowError::SelfJoin);
        }
        if stake != m.stake {
            return Err(EscrowError::StakeMismatch);
        }
        if !self.store.ledger.can_cover(&joiner, stake) {
            return Err(EscrowError::InsufficientFunds);
        }

        // Commit.
        self.store
            .ledger
            .escrow(match_id, joiner, stake)
            .expect("escrow cannot fail after the cover check");
        self.store
            .registry
            .join(match_id, joiner)
            .expect("join cannot fail after validation");

        self.record(TransitionOp::Joined {
            match_id,
            opponent: joiner,
            stake,
        });
        self.events.emit(MatchEventData::Joined {
            match_id,
            opponent: joiner,
        });
        info!(%match_id, opponent = %joiner, "match joined");
        Ok(())
    }

    /// Settle a match with a proof of loss.
    ///
    /// The caller asserts who lost and supplies that party's signature over
    /// the canonical loss message. No caller-identity check is made: anyone
    /// holding a valid loser signature for a genuine participant can
    /// trigger payout to the other participant. Whichever valid signature
    /// arrives first wins — the proof attests to an outcome, not to how the
    /// game got there.
    ///
    /// Returns the winner paid.
    pub fn submit_claim(
        &mut self,
        match_id: MatchId,
        claimed_loser: Address,
        signature: &[u8],
    ) -> Result<Address, EscrowError> {
        let m = self.store.registry.read(match_id)?;
        if m.state != MatchState::Active {
            return Err(EscrowError::NotActive);
        }
        if !m.is_participant(&claimed_loser) {
            return Err(EscrowError::UnknownParty);
        }

        let signer = recover_loss_signer(match_id, signature).map_err(|err| {
            debug!(%match_id, %err, "settlement proof rejected");
            EscrowError::InvalidSignature
        })?;
        if signer != claimed_loser {
            debug!(%match_id, recovered = %signer, claimed = %claimed_loser,
                "settlement proof signed by the wrong party");
            return Err(EscrowError::InvalidSignature);
        }

        let winner = m
            .opponent_of(&claimed_loser)
            .ok_or(EscrowError::UnknownParty)?;

        // Commit: release then settle, one indivisible unit.
        let amount = self.store.ledger.release(match_id, winner)?;
        self.store
            .registry
            .settle(match_id, winner)
            .expect("settle cannot fail after validation");

        self.record(TransitionOp::Settled {
            match_id,
            winner,
            amount,
        });
        self.events.emit(MatchEventData::Settled {
            match_id,
            winner,
            amount,
        });
        info!(%match_id, %winner, %amount, "match settled");
        Ok(winner)
    }

    /// Abort a match, returning every escrowed stake to its payer.
    ///
    /// Valid for `Open` and `Active` matches. The engine does not decide
    /// *who* may abort — cancel-by-creator, mutual consent, or operator
    /// policy all live with the embedder.
    ///
    /// Returns the total refunded.
    pub fn void_match(&mut self, match_id: MatchId) -> Result<Amount, EscrowError> {
        let m = self.store.registry.read(match_id)?;
        if m.state.is_terminal() {
            return Err(EscrowError::NotActive);
        }
        if self.store.ledger.held(match_id).is_zero() {
            return Err(EscrowError::NothingToRelease);
        }

        // Commit.
        let refunded = self
            .store
            .ledger
            .void(match_id)
            .expect("void cannot fail after the held check");
        self.store
            .registry
            .void(match_id)
            .expect("void cannot fail after validation");

        self.record(TransitionOp::Voided { match_id, refunded });
        self.events.emit(MatchEventData::Voided { match_id, refunded });
        info!(%match_id, %refunded, "match voided");
        Ok(refunded)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Snapshot of a match's latest committed state.
    pub fn read(&self, match_id: MatchId) -> Result<Match, EscrowError> {
        self.store.registry.read(match_id)
    }

    fn record(&mut self, op: TransitionOp) {
        if let Some(journal) = &mut self.journal {
            if let Err(err) = journal.append(op) {
                error!(%err, "journal append failed; committed state stands");
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

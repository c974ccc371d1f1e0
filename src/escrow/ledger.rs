//! Stake Ledger
//!
//! Custody of funds: free balances per account, plus escrowed stakes keyed
//! by match id. Pure bookkeeping — the ledger knows nothing about match
//! lifecycle; the engine keeps ledger mutations atomic with registry
//! transitions.
//!
//! Uses BTreeMap so snapshots and digests iterate in a stable order.

use std::collections::BTreeMap;

use crate::core::amount::Amount;
use crate::core::hash::{StateDigest, StateHasher};
use crate::core::identity::Address;
use crate::escrow::error::EscrowError;
use crate::escrow::registry::MatchId;

/// One escrowed contribution, remembered so a void can return it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contribution {
    /// Who paid the stake in.
    pub payer: Address,
    /// How much was escrowed.
    pub amount: Amount,
}

/// Funds custody for all matches.
#[derive(Clone, Debug, Default)]
pub struct StakeLedger {
    /// Free (spendable) balance per account.
    balances: BTreeMap<Address, Amount>,
    /// Escrowed contributions per match, in escrow order.
    escrowed: BTreeMap<MatchId, Vec<Contribution>>,
}

impl StakeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account's free balance.
    pub fn deposit(&mut self, account: Address, amount: Amount) {
        let balance = self.balances.entry(account).or_insert(Amount::ZERO);
        // Deposits never fail; saturate at the atto-unit ceiling.
        *balance = balance.checked_add(amount).unwrap_or(Amount::atto(u128::MAX));
    }

    /// Free balance of an account.
    pub fn available(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    /// Whether `payer` can cover `amount` from free balance.
    pub fn can_cover(&self, payer: &Address, amount: Amount) -> bool {
        self.available(payer) >= amount
    }

    /// Move `amount` from `payer`'s free balance into the match's pot.
    pub fn escrow(
        &mut self,
        match_id: MatchId,
        payer: Address,
        amount: Amount,
    ) -> Result<(), EscrowError> {
        let balance = self.available(&payer);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(EscrowError::InsufficientFunds)?;

        self.balances.insert(payer, remaining);
        self.escrowed
            .entry(match_id)
            .or_default()
            .push(Contribution { payer, amount });
        Ok(())
    }

    /// Transfer the entire held pot for `match_id` to `payee`, zeroing it.
    ///
    /// Returns the amount released.
    pub fn release(&mut self, match_id: MatchId, payee: Address) -> Result<Amount, EscrowError> {
        let pot = self.held(match_id);
        if pot.is_zero() {
            return Err(EscrowError::NothingToRelease);
        }

        self.escrowed.remove(&match_id);
        self.deposit(payee, pot);
        Ok(pot)
    }

    /// Return every escrowed contribution for `match_id` to its payer.
    ///
    /// Returns the total refunded.
    pub fn void(&mut self, match_id: MatchId) -> Result<Amount, EscrowError> {
        let contributions = self
            .escrowed
            .remove(&match_id)
            .filter(|c| !c.is_empty())
            .ok_or(EscrowError::NothingToRelease)?;

        let mut refunded = Amount::ZERO;
        for c in contributions {
            self.deposit(c.payer, c.amount);
            refunded = refunded.checked_add(c.amount).unwrap_or(refunded);
        }
        Ok(refunded)
    }

    /// Current pot held for a match.
    pub fn held(&self, match_id: MatchId) -> Amount {
        self.escrowed
            .get(&match_id)
            .map(|cs| {
                cs.iter().fold(Amount::ZERO, |acc, c| {
                    acc.checked_add(c.amount).unwrap_or(acc)
                })
            })
            .unwrap_or(Amount::ZERO)
    }

    /// Total funds the ledger accounts for, free and escrowed.
    pub fn total(&self) -> Amount {
        let free = self
            .balances
            .values()
            .fold(Amount::ZERO, |acc, a| acc.checked_add(*a).unwrap_or(acc));
        self.escrowed.keys().fold(free, |acc, id| {
            acc.checked_add(self.held(*id)).unwrap_or(acc)
        })
    }

    /// Fold this ledger's state into a digest.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        for (account, balance) in &self.balances {
            hasher.update_bytes(account.as_bytes());
            hasher.update_u128(balance.as_atto());
        }
        for (match_id, contributions) in &self.escrowed {
            hasher.update_u64(match_id.as_u64());
            for c in contributions {
                hasher.update_bytes(c.payer.as_bytes());
                hasher.update_u128(c.amount.as_atto());
            }
        }
    }

    /// Digest of the ledger alone.
    pub fn digest(&self) -> StateDigest {
        let mut hasher = StateHasher::new(b"CHESS_WAGER_LEDGER_V1");
        self.hash_into(&mut hasher);
        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================

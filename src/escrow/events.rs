//! Lifecycle Events
//!
//! Transition notifications for off-core observers (UIs, opponents).
//! Delivery is best-effort over a broadcast channel: consumers must tolerate
//! lag, loss, and redelivery, and must key their state off
//! `read(match_id)` — never off event payloads alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::amount::Amount;
use crate::core::identity::Address;
use crate::escrow::registry::MatchId;

/// Event payload data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEventData {
    /// A match was created and the creator's stake escrowed.
    Created {
        /// The new match.
        match_id: MatchId,
        /// Who created it.
        creator: Address,
        /// Stake required from each side.
        stake: Amount,
    },

    /// A second player joined and escrowed the matching stake.
    Joined {
        /// The match joined.
        match_id: MatchId,
        /// The joining player.
        opponent: Address,
    },

    /// The pot was released to the winner.
    Settled {
        /// The settled match.
        match_id: MatchId,
        /// Who received the pot.
        winner: Address,
        /// Pot size (twice the stake).
        amount: Amount,
    },

    /// The match was aborted and stakes refunded.
    Voided {
        /// The voided match.
        match_id: MatchId,
        /// Total refunded across payers.
        refunded: Amount,
    },
}

impl MatchEventData {
    /// The match this event concerns.
    pub fn match_id(&self) -> MatchId {
        match self {
            MatchEventData::Created { match_id, .. }
            | MatchEventData::Joined { match_id, .. }
            | MatchEventData::Settled { match_id, .. }
            | MatchEventData::Voided { match_id, .. } => *match_id,
        }
    }
}

/// A lifecycle event with ordering metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Global emission sequence number (per engine, starts at 1).
    pub seq: u64,
    /// When the transition committed.
    pub at: DateTime<Utc>,
    /// What happened.
    pub data: MatchEventData,
}

/// Broadcast channel for lifecycle events.
pub struct EventChannel {
    tx: broadcast::Sender<MatchEvent>,
    next_seq: u64,
}

impl EventChannel {
    /// Create a channel buffering up to `capacity` undelivered events per
    /// subscriber before lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, next_seq: 1 }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.tx.subscribe()
    }

    /// Stamp and emit an event. Returns it for journaling.
    ///
    /// A send with no live subscribers is not an error; the transition has
    /// already committed.
    pub fn emit(&mut self, data: MatchEventData) -> MatchEvent {
        let event = MatchEvent {
            seq: self.next_seq,
            at: Utc::now(),
            data,
        };
        self.next_seq += 1;
        let _ = self.tx.send(event.clone());
        event
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let mut channel = EventChannel::new(16);
        let mut rx = channel.subscribe();

        let id = MatchId::new(1);
        channel.emit(MatchEventData::Created {
            match_id: id,
            creator: Address::new([1; 20]),
            stake: Amount::units(1),
        });
        channel.emit(MatchEventData::Joined {
            match_id: id,
            opponent: Address::new([2; 20]),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert!(matches!(first.data, MatchEventData::Created { .. }));
        assert!(matches!(second.data, MatchEventData::Joined { .. }));
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let mut channel = EventChannel::new(4);
        assert_eq!(channel.subscriber_count(), 0);

        let event = channel.emit(MatchEventData::Voided {
            match_id: MatchId::new(5),
            refunded: Amount::units(2),
        });
        assert_eq!(event.seq, 1);
        assert_eq!(event.data.match_id(), MatchId::new(5));
    }

    #[test]
    fn test_event_json_shape() {
        let event = MatchEvent {
            seq: 3,
            at: Utc::now(),
            data: MatchEventData::Settled {
                match_id: MatchId::new(2),
                winner: Address::new([7; 20]),
                amount: Amount::units(2),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"settled\""));

        let back: MatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

//! Transition Journal
//!
//! Append-only log of committed transitions. Each record is a
//! length-prefixed bincode frame, so a journal can be appended to forever
//! and read back without an index. Replaying a journal into a fresh store
//! reproduces the live store's digest — timestamps aside, the journal *is*
//! the state.

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::amount::Amount;
use crate::core::identity::Address;
use crate::escrow::engine::EscrowStore;
use crate::escrow::error::EscrowError;
use crate::escrow::registry::MatchId;

/// A committed transition, with enough data to replay it.
///
/// Externally tagged on purpose: frames are bincode, which cannot
/// round-trip internally-tagged enums.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOp {
    /// Free balance credited.
    Deposited {
        /// Account credited.
        account: Address,
        /// Amount credited.
        amount: Amount,
    },

    /// Match created, creator's stake escrowed.
    Created {
        /// Allocated id.
        match_id: MatchId,
        /// Creator (player one).
        creator: Address,
        /// Stake per side.
        stake: Amount,
    },

    /// Second player joined, stake escrowed, match active.
    Joined {
        /// The match.
        match_id: MatchId,
        /// Joining player (player two).
        opponent: Address,
        /// Stake escrowed (equals the match stake).
        stake: Amount,
    },

    /// Pot released, match settled.
    Settled {
        /// The match.
        match_id: MatchId,
        /// Winner paid.
        winner: Address,
        /// Pot released.
        amount: Amount,
    },

    /// Stakes refunded, match voided.
    Voided {
        /// The match.
        match_id: MatchId,
        /// Total refunded.
        refunded: Amount,
    },
}

/// One journal entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Append sequence, starting at 1.
    pub seq: u64,
    /// Wall-clock time of the append.
    pub at: DateTime<Utc>,
    /// The committed transition.
    pub op: TransitionOp,
}

/// Journal errors.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying I/O failed.
    #[error("journal I/O: {0}")]
    Io(#[from] io::Error),

    /// A frame could not be encoded or decoded.
    #[error("journal codec: {0}")]
    Codec(#[from] bincode::Error),

    /// A frame length prefix is implausible.
    #[error("corrupt journal: frame of {0} bytes")]
    FrameTooLarge(u32),

    /// Replay applied a record the store rejected.
    #[error("replay rejected record {seq}: {source}")]
    Replay {
        /// Sequence of the offending record.
        seq: u64,
        /// Why the store rejected it.
        source: EscrowError,
    },

    /// Replay allocated a different match id than the record claims.
    #[error("replay id drift at record {seq}")]
    IdDrift {
        /// Sequence of the offending record.
        seq: u64,
    },
}

/// Largest frame accepted when reading. A transition record is tens of
/// bytes; anything near this bound is corruption.
const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Appends length-prefixed transition records to a writer.
pub struct JournalWriter<W: Write> {
    writer: W,
    next_seq: u64,
}

impl<W: Write> JournalWriter<W> {
    /// Wrap a writer positioned at the journal's end.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_seq: 1,
        }
    }

    /// Append one committed transition. Flushes the frame.
    pub fn append(&mut self, op: TransitionOp) -> Result<TransitionRecord, JournalError> {
        let record = TransitionRecord {
            seq: self.next_seq,
            at: Utc::now(),
            op,
        };

        let payload = bincode::serialize(&record)?;
        let len = payload.len() as u32;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;

        self.next_seq += 1;
        Ok(record)
    }

    /// Number of records appended so far.
    pub fn len(&self) -> u64 {
        self.next_seq - 1
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.next_seq == 1
    }
}

/// Read every record from a journal stream.
pub fn read_records<R: Read>(mut reader: R) -> Result<Vec<TransitionRecord>, JournalError> {
    let mut records = Vec::new();

    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }

        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(JournalError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload)?;
        records.push(bincode::deserialize(&payload)?);
    }

    Ok(records)
}

/// Fold journal records into a fresh store.
///
/// The rebuilt store's digest equals the digest of the store the journal
/// was recorded from (digests exclude timestamps).
pub fn replay(records: &[TransitionRecord]) -> Result<EscrowStore, JournalError> {
    let mut store = EscrowStore::new();

    for record in records {
        let seq = record.seq;
        match &record.op {
            TransitionOp::Deposited { account, amount } => {
                store.ledger.deposit(*account, *amount);
            }
            TransitionOp::Created {
                match_id,
                creator,
                stake,
            } => {
                let allocated = store.registry.create(*creator, *stake);
                if allocated != *match_id {
                    return Err(JournalError::IdDrift { seq });
                }
                store
                    .ledger
                    .escrow(*match_id, *creator, *stake)
                    .map_err(|source| JournalError::Replay { seq, source })?;
            }
            TransitionOp::Joined {
                match_id,
                opponent,
                stake,
            } => {
                store
                    .ledger
                    .escrow(*match_id, *opponent, *stake)
                    .map_err(|source| JournalError::Replay { seq, source })?;
                store
                    .registry
                    .join(*match_id, *opponent)
                    .map_err(|source| JournalError::Replay { seq, source })?;
            }
            TransitionOp::Settled {
                match_id, winner, ..
            } => {
                store
                    .ledger
                    .release(*match_id, *winner)
                    .map_err(|source| JournalError::Replay { seq, source })?;
                store
                    .registry
                    .settle(*match_id, *winner)
                    .map_err(|source| JournalError::Replay { seq, source })?;
            }
            TransitionOp::Voided { match_id, .. } => {
                store
                    .ledger
                    .void(*match_id)
                    .map_err(|source| JournalError::Replay { seq, source })?;
                store
                    .registry
                    .void(*match_id)
                    .map_err(|source| JournalError::Replay { seq, source })?;
            }
        }
    }

    Ok(store)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::engine::EscrowEngine;
    use crate::settlement::signer::LossSigner;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory sink standing in for a journal file.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_append_read_roundtrip() {
        let buf = SharedBuf::default();
        let mut writer = JournalWriter::new(buf.clone());

        let alice = Address::new([1; 20]);
        writer
            .append(TransitionOp::Deposited {
                account: alice,
                amount: Amount::units(2),
            })
            .unwrap();
        writer
            .append(TransitionOp::Created {
                match_id: MatchId::new(1),
                creator: alice,
                stake: Amount::units(1),
            })
            .unwrap();
        assert_eq!(writer.len(), 2);

        let bytes = buf.0.lock().unwrap().clone();
        let records = read_records(Cursor::new(bytes)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
        assert!(matches!(records[0].op, TransitionOp::Deposited { .. }));
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let buf = SharedBuf::default();
        let mut writer = JournalWriter::new(buf.clone());
        writer
            .append(TransitionOp::Deposited {
                account: Address::new([1; 20]),
                amount: Amount::units(1),
            })
            .unwrap();

        let mut bytes = buf.0.lock().unwrap().clone();
        bytes.truncate(bytes.len() - 3);
        assert!(read_records(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(MAX_FRAME_LEN + 1).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        assert!(matches!(
            read_records(Cursor::new(bytes)),
            Err(JournalError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_replay_reproduces_engine_state() {
        let alice = LossSigner::from_secret_bytes(&[0xa1; 32]).unwrap();
        let bob = LossSigner::from_secret_bytes(&[0xb0; 32]).unwrap();

        let buf = SharedBuf::default();
        let mut engine =
            EscrowEngine::with_journal(EscrowStore::new(), Box::new(buf.clone()));

        engine.deposit(alice.address(), Amount::units(3));
        engine.deposit(bob.address(), Amount::units(3));

        // One settled match, one voided, one left open.
        let settled = engine
            .create_match(alice.address(), Amount::units(1))
            .unwrap();
        engine
            .join_match(settled, bob.address(), Amount::units(1))
            .unwrap();
        let proof = bob.sign_loss(settled);
        engine
            .submit_claim(settled, bob.address(), &proof)
            .unwrap();

        let voided = engine
            .create_match(bob.address(), Amount::units(1))
            .unwrap();
        engine.void_match(voided).unwrap();

        engine
            .create_match(alice.address(), Amount::units(2))
            .unwrap();

        let bytes = buf.0.lock().unwrap().clone();
        let records = read_records(Cursor::new(bytes)).unwrap();
        let rebuilt = replay(&records).unwrap();

        assert_eq!(rebuilt.digest(), engine.store().digest());
    }

    #[test]
    fn test_replay_detects_id_drift() {
        let records = vec![TransitionRecord {
            seq: 1,
            at: Utc::now(),
            op: TransitionOp::Created {
                match_id: MatchId::new(5),
                creator: Address::new([1; 20]),
                stake: Amount::units(1),
            },
        }];

        assert!(matches!(
            replay(&records),
            Err(JournalError::IdDrift { seq: 1 })
        ));
    }

    #[test]
    fn test_replay_rejects_impossible_op() {
        // A settle with nothing escrowed cannot replay.
        let records = vec![TransitionRecord {
            seq: 1,
            at: Utc::now(),
            op: TransitionOp::Settled {
                match_id: MatchId::new(1),
                winner: Address::new([1; 20]),
                amount: Amount::units(2),
            },
        }];

        assert!(matches!(
            replay(&records),
            Err(JournalError::Replay { seq: 1, .. })
        ));
    }
}

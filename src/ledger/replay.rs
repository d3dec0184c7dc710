/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Deterministic replay of ledger journals.
//!
//! [`LedgerReplay`] reads a sequence of [`LedgerEvent`]s from a [`Journal`]
//! and re-applies each record to fresh indexes, reproducing the ledger state
//! that existed when the last event was written. The same invariants the live
//! ledger enforces are re-checked, so a tampered or mixed-up journal is
//! rejected instead of silently producing a double assignment.

use super::document::Amendment;
use super::index::LedgerIndex;
use super::journal::{Journal, LedgerEvent, LedgerRecord};
use crate::types::{DocumentId, EquipmentId};
use std::marker::PhantomData;
use thiserror::Error;

/// Errors that can occur during journal replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The journal contains no events to replay.
    #[error("journal is empty, nothing to replay")]
    EmptyJournal,

    /// The requested starting sequence number exceeds the journal's last entry.
    #[error("invalid from_sequence {from_sequence}: journal last sequence is {last_sequence}")]
    InvalidSequence {
        /// The sequence number requested.
        from_sequence: u64,
        /// The last sequence number in the journal.
        last_sequence: u64,
    },

    /// A gap was detected between expected and found sequence numbers.
    #[error("sequence gap detected: expected {expected}, found {found}")]
    SequenceGap {
        /// The expected next sequence number.
        expected: u64,
        /// The actual sequence number found.
        found: u64,
    },

    /// Two commits bind the same number.
    #[error(
        "conflicting commit at sequence {sequence_num}: number {number} of equipment {equipment_id} is already assigned"
    )]
    ConflictingCommit {
        /// Sequence number of the offending event.
        sequence_num: u64,
        /// Equipment of the number.
        equipment_id: EquipmentId,
        /// The doubly-bound number.
        number: u64,
    },

    /// An amendment references a document that was never committed.
    #[error("amendment at sequence {sequence_num} references unknown document {document_id}")]
    UnknownDocument {
        /// Sequence number of the offending event.
        sequence_num: u64,
        /// The missing document.
        document_id: DocumentId,
    },
}

/// Result of a full replay.
pub(crate) struct Rebuilt {
    pub index: LedgerIndex,
    pub next_sequence: u64,
    pub next_document_id: u64,
}

/// Stateless replay engine that reconstructs ledger state from a [`Journal`].
///
/// All methods are associated functions; `LedgerReplay` is a namespace.
pub struct LedgerReplay<J> {
    _phantom: PhantomData<J>,
}

impl<J: Journal> LedgerReplay<J> {
    /// Replays every event and returns the rebuilt indexes.
    ///
    /// An empty journal rebuilds an empty ledger.
    pub(crate) fn rebuild(journal: &J) -> Result<Rebuilt, ReplayError> {
        let index = LedgerIndex::default();
        let mut expected = 1u64;
        let mut next_document_id = 1u64;

        for event in journal.read_from(0) {
            if event.sequence_num != expected {
                return Err(ReplayError::SequenceGap {
                    expected,
                    found: event.sequence_num,
                });
            }
            Self::apply_event(&index, event)?;
            if let LedgerRecord::Committed { document, .. } = &event.record {
                next_document_id = next_document_id.max(document.id.0 + 1);
            }
            expected += 1;
        }

        Ok(Rebuilt {
            index,
            next_sequence: expected,
            next_document_id,
        })
    }

    /// Counts the documents a full replay would produce, validating every
    /// event on the way.
    ///
    /// # Errors
    ///
    /// Any [`ReplayError`] a rebuild would raise.
    pub fn verify(journal: &J) -> Result<usize, ReplayError> {
        Self::rebuild(journal).map(|rebuilt| rebuilt.index.len())
    }

    /// Returns the events with `from_sequence <= sequence_num <= to_sequence`.
    ///
    /// Nothing is rebuilt; this is a pure slice of the journal for audit
    /// export.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::EmptyJournal`] if the journal has no events
    /// - [`ReplayError::InvalidSequence`] if `from_sequence` > last journal sequence
    pub fn replay_range(
        journal: &J,
        from_sequence: u64,
        to_sequence: u64,
    ) -> Result<Vec<&LedgerEvent>, ReplayError> {
        let Some(last_sequence) = journal.last_sequence() else {
            return Err(ReplayError::EmptyJournal);
        };
        if from_sequence > last_sequence {
            return Err(ReplayError::InvalidSequence {
                from_sequence,
                last_sequence,
            });
        }
        Ok(journal.read_range(from_sequence, to_sequence).collect())
    }

    fn apply_event(index: &LedgerIndex, event: &LedgerEvent) -> Result<(), ReplayError> {
        match &event.record {
            LedgerRecord::Committed {
                document,
                fingerprint,
            } => {
                if index
                    .id_for_number(document.equipment_id, document.number)
                    .is_some()
                {
                    return Err(ReplayError::ConflictingCommit {
                        sequence_num: event.sequence_num,
                        equipment_id: document.equipment_id,
                        number: document.number,
                    });
                }
                index.insert_committed(document.clone(), fingerprint.clone());
            }
            LedgerRecord::Amended {
                document_id,
                user,
                changes,
                document,
            } => {
                if index.get(*document_id).is_none() {
                    return Err(ReplayError::UnknownDocument {
                        sequence_num: event.sequence_num,
                        document_id: *document_id,
                    });
                }
                index.apply_amendment(
                    document.clone(),
                    Amendment {
                        sequence_num: event.sequence_num,
                        at_ms: event.timestamp_ms,
                        user: user.clone(),
                        changes: changes.clone(),
                    },
                );
            }
            LedgerRecord::SequenceAdvanced {
                equipment_id,
                next_candidate,
            } => index.raise_high_water(*equipment_id, *next_candidate),
        }
        Ok(())
    }
}

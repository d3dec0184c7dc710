/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Journal trait and in-memory implementation for ledger events.
//!
//! A journal is an append-only log of [`LedgerEvent`]s. It is the durable
//! source of truth for the [`AssignmentLedger`]: every index the ledger keeps
//! in memory can be rebuilt by replaying it.
//!
//! [`AssignmentLedger`]: super::AssignmentLedger

use super::document::{AssignedDocument, FieldChange};
use crate::types::{DocumentId, EquipmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by journal storage.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying storage failed.
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("journal encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored frame failed validation.
    #[error("corrupt journal frame at byte {offset}: {reason}")]
    Corrupt {
        /// Byte offset of the frame.
        offset: u64,
        /// What failed.
        reason: String,
    },

    /// An event was appended out of order.
    #[error("journal sequence gap: expected {expected}, got {found}")]
    SequenceGap {
        /// The next sequence number the journal expected.
        expected: u64,
        /// The sequence number that was offered.
        found: u64,
    },
}

/// Payload of one journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerRecord {
    /// A number was bound to a new document.
    Committed {
        /// The created document.
        document: AssignedDocument,
        /// Payload fingerprint used for idempotent retries.
        fingerprint: String,
    },

    /// Descriptive fields of a document were amended.
    Amended {
        /// Id of the amended document.
        document_id: DocumentId,
        /// Who amended it.
        user: String,
        /// Field-level diff.
        changes: Vec<FieldChange>,
        /// State after the amendment.
        document: AssignedDocument,
    },

    /// An equipment's auto-increment high-water mark moved forward.
    SequenceAdvanced {
        /// Equipment whose sequence advanced.
        equipment_id: EquipmentId,
        /// New `next_candidate`.
        next_candidate: u64,
    },
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Gap-free sequence number, starting at 1.
    pub sequence_num: u64,
    /// Write time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// What happened.
    pub record: LedgerRecord,
}

impl LedgerEvent {
    /// Creates a new ledger event.
    #[must_use]
    pub fn new(sequence_num: u64, timestamp_ms: u64, record: LedgerRecord) -> Self {
        Self {
            sequence_num,
            timestamp_ms,
            record,
        }
    }
}

/// Append-only event log for [`LedgerEvent`]s.
///
/// Implementations must preserve insertion order, reject sequence gaps, and
/// must not report success from [`append`](Journal::append) before the event
/// is as durable as the implementation can make it.
pub trait Journal: Send + 'static {
    /// Appends a new event to the journal.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SequenceGap`] if `event.sequence_num` is not
    /// exactly one past [`last_sequence`](Journal::last_sequence), or a
    /// storage error.
    fn append(&mut self, event: LedgerEvent) -> Result<(), JournalError>;

    /// Returns an iterator over all events with `sequence_num >= from_sequence`.
    fn read_from(&self, from_sequence: u64) -> impl Iterator<Item = &LedgerEvent> + '_;

    /// Returns an iterator over events with `from_sequence <= sequence_num <= to_sequence`.
    fn read_range(
        &self,
        from_sequence: u64,
        to_sequence: u64,
    ) -> impl Iterator<Item = &LedgerEvent> + '_;

    /// Returns the total number of events stored.
    #[must_use]
    fn len(&self) -> usize;

    /// Returns `true` if no events have been appended.
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sequence number of the last event, or `None` if empty.
    #[must_use]
    fn last_sequence(&self) -> Option<u64>;
}

/// Checks that `event` directly follows `last`.
pub(crate) fn check_next(last: Option<u64>, event: &LedgerEvent) -> Result<(), JournalError> {
    let expected = last.map_or(1, |s| s + 1);
    if event.sequence_num != expected {
        return Err(JournalError::SequenceGap {
            expected,
            found: event.sequence_num,
        });
    }
    Ok(())
}

/// In-memory implementation of [`Journal`].
///
/// Nothing survives the process. Suitable for tests and for deployments that
/// accept losing the ledger on restart.
///
/// # Examples
///
/// ```
/// use docnum_rs::ledger::{InMemoryJournal, Journal, LedgerEvent, LedgerRecord};
/// use docnum_rs::EquipmentId;
///
/// let mut journal = InMemoryJournal::new();
/// assert!(journal.is_empty());
///
/// let event = LedgerEvent::new(
///     1,
///     0,
///     LedgerRecord::SequenceAdvanced { equipment_id: EquipmentId(7), next_candidate: 11 },
/// );
/// journal.append(event).unwrap();
/// assert_eq!(journal.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    events: Vec<LedgerEvent>,
}

impl InMemoryJournal {
    /// Creates a new empty in-memory journal.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Creates a new in-memory journal with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Returns a slice of all stored events.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }
}

impl Journal for InMemoryJournal {
    fn append(&mut self, event: LedgerEvent) -> Result<(), JournalError> {
        check_next(self.last_sequence(), &event)?;
        self.events.push(event);
        Ok(())
    }

    fn read_from(&self, from_sequence: u64) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.sequence_num >= from_sequence)
    }

    fn read_range(
        &self,
        from_sequence: u64,
        to_sequence: u64,
    ) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.events
            .iter()
            .filter(move |e| e.sequence_num >= from_sequence && e.sequence_num <= to_sequence)
    }

    #[inline]
    fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    fn last_sequence(&self) -> Option<u64> {
        self.events.last().map(|e| e.sequence_num)
    }
}

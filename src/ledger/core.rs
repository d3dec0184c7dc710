/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! The assignment ledger.
//!
//! Writes are serialized behind one async lock that owns the journal: each
//! write validates against the indexes, appends to the journal, and only then
//! publishes to the indexes. A write that fails to reach the journal leaves no
//! trace. Reads go straight to the indexes and never wait for a writer.

use super::document::{Amendment, AssignedDocument, CommitRequest, DocumentUpdate};
use super::index::{LedgerIndex, name_key};
use super::journal::{InMemoryJournal, Journal, LedgerEvent, LedgerRecord};
use super::query::LedgerQuery;
use super::replay::{LedgerReplay, ReplayError};
use crate::clock::{Clock, SystemClock};
use crate::error::{ReservationError, Result};
use crate::types::{DocumentId, EquipmentId, SessionToken};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

struct LedgerWriter<J> {
    journal: J,
    next_sequence: u64,
    next_document_id: u64,
}

impl<J: Journal> LedgerWriter<J> {
    fn append(&mut self, timestamp_ms: u64, record: LedgerRecord) -> Result<u64> {
        let sequence_num = self.next_sequence;
        let event = LedgerEvent::new(sequence_num, timestamp_ms, record);
        if let Err(e) = self.journal.append(event) {
            error!(sequence_num, error = %e, "ledger journal append failed");
            return Err(e.into());
        }
        self.next_sequence += 1;
        Ok(sequence_num)
    }
}

/// Durable record of every number bound to a document.
///
/// # Examples
///
/// ```
/// use docnum_rs::ledger::{AssignmentLedger, CommitRequest, DocumentDraft};
/// use docnum_rs::{EquipmentId, SessionToken};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = AssignmentLedger::in_memory();
/// let request = CommitRequest {
///     session: SessionToken::new(),
///     number: 1,
///     equipment_id: EquipmentId(42),
///     draft: DocumentDraft::new("Wiring diagram"),
///     user: "operator".to_string(),
/// };
/// let first = ledger.commit(request.clone()).await?;
/// let retry = ledger.commit(request).await?;
/// assert_eq!(first, retry);
/// assert_eq!(ledger.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct AssignmentLedger<J: Journal = InMemoryJournal> {
    writer: Mutex<LedgerWriter<J>>,
    index: LedgerIndex,
    clock: Arc<dyn Clock>,
}

impl AssignmentLedger<InMemoryJournal> {
    /// Creates an empty ledger over an in-memory journal and the system clock.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_rebuilt(
            InMemoryJournal::new(),
            LedgerIndex::default(),
            1,
            1,
            Arc::new(SystemClock),
        )
    }
}

impl<J: Journal> AssignmentLedger<J> {
    /// Opens a ledger over `journal`, replaying whatever it already holds.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] if the stored events are inconsistent.
    pub fn open(journal: J, clock: Arc<dyn Clock>) -> std::result::Result<Self, ReplayError> {
        let rebuilt = LedgerReplay::rebuild(&journal)?;
        info!(
            events = rebuilt.next_sequence - 1,
            documents = rebuilt.index.len(),
            "ledger opened"
        );
        Ok(Self::from_rebuilt(
            journal,
            rebuilt.index,
            rebuilt.next_sequence,
            rebuilt.next_document_id,
            clock,
        ))
    }

    fn from_rebuilt(
        journal: J,
        index: LedgerIndex,
        next_sequence: u64,
        next_document_id: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            writer: Mutex::new(LedgerWriter {
                journal,
                next_sequence,
                next_document_id,
            }),
            index,
            clock,
        }
    }

    /// Durably binds `request.number` to a new document and returns it.
    ///
    /// Retrying with the same `(session, number)` and the same payload returns
    /// the document created by the first attempt.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] for an empty document name
    /// - [`ReservationError::AlreadyAssigned`] if the number is already bound,
    ///   or the same `(session, number)` was committed with a different payload
    /// - [`ReservationError::DuplicateDocument`] if the equipment already has a
    ///   document with the same name and note
    /// - [`ReservationError::Journal`] if the write did not reach the journal
    pub async fn commit(&self, request: CommitRequest) -> Result<AssignedDocument> {
        if request.draft.doc_name.trim().is_empty() {
            return Err(ReservationError::invalid("document name must not be empty"));
        }
        let fingerprint = request.fingerprint();

        let mut writer = self.writer.lock().await;

        if let Some(existing) = self.index.session_commit(request.session, request.number) {
            return match self.index.get(existing.document_id) {
                Some(document) if existing.fingerprint == fingerprint => {
                    debug!(
                        document_id = %document.id,
                        number = request.number,
                        "commit retried, returning existing document"
                    );
                    Ok(document)
                }
                _ => Err(ReservationError::AlreadyAssigned {
                    equipment_id: request.equipment_id,
                    number: request.number,
                }),
            };
        }

        if self
            .index
            .id_for_number(request.equipment_id, request.number)
            .is_some()
        {
            return Err(ReservationError::AlreadyAssigned {
                equipment_id: request.equipment_id,
                number: request.number,
            });
        }

        let key = name_key(
            request.equipment_id,
            &request.draft.doc_name,
            request.draft.note.as_deref(),
        );
        if self.index.id_for_name(&key).is_some() {
            return Err(ReservationError::DuplicateDocument {
                equipment_id: request.equipment_id,
                doc_name: request.draft.doc_name,
            });
        }

        let now = self.clock.now_ms();
        let document = AssignedDocument {
            id: DocumentId(writer.next_document_id),
            number: request.number,
            equipment_id: request.equipment_id,
            session: request.session,
            doc_name: request.draft.doc_name,
            note: request.draft.note,
            user: request.user,
            created_at_ms: now,
            equipment_label: Default::default(),
        };

        writer.append(
            now,
            LedgerRecord::Committed {
                document: document.clone(),
                fingerprint: fingerprint.clone(),
            },
        )?;
        writer.next_document_id += 1;
        self.index.insert_committed(document.clone(), fingerprint);

        info!(
            document_id = %document.id,
            equipment_id = %document.equipment_id,
            number = document.number,
            user = %document.user,
            "number assigned"
        );
        Ok(document)
    }

    /// Amends descriptive fields of a document.
    ///
    /// The bound number and equipment never change. An update that changes
    /// nothing is not journaled.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`] for an unknown id
    /// - [`ReservationError::InvalidArgument`] for an empty new name
    /// - [`ReservationError::DuplicateDocument`] if the new name and note collide
    /// - [`ReservationError::Journal`] if the write did not reach the journal
    pub async fn update(
        &self,
        document_id: DocumentId,
        update: DocumentUpdate,
        user: &str,
    ) -> Result<AssignedDocument> {
        if update
            .doc_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ReservationError::invalid("document name must not be empty"));
        }

        let mut writer = self.writer.lock().await;

        let current = self
            .index
            .get(document_id)
            .ok_or(ReservationError::NotFound(document_id))?;
        let (next, changes) = update.apply(&current);
        if changes.is_empty() {
            return Ok(current);
        }

        let key = name_key(next.equipment_id, &next.doc_name, next.note.as_deref());
        if self
            .index
            .id_for_name(&key)
            .is_some_and(|owner| owner != document_id)
        {
            return Err(ReservationError::DuplicateDocument {
                equipment_id: next.equipment_id,
                doc_name: next.doc_name,
            });
        }

        let now = self.clock.now_ms();
        let sequence_num = writer.append(
            now,
            LedgerRecord::Amended {
                document_id,
                user: user.to_string(),
                changes: changes.clone(),
                document: next.clone(),
            },
        )?;
        self.index.apply_amendment(
            next.clone(),
            Amendment {
                sequence_num,
                at_ms: now,
                user: user.to_string(),
                changes,
            },
        );

        info!(document_id = %document_id, user, "document amended");
        Ok(next)
    }

    /// Persists a new auto-increment high-water mark for an equipment.
    ///
    /// Marks that do not move forward are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Journal`] if the write did not reach the journal.
    pub async fn record_high_water(
        &self,
        equipment_id: EquipmentId,
        next_candidate: u64,
    ) -> Result<()> {
        let mut writer = self.writer.lock().await;
        if self
            .index
            .high_water(equipment_id)
            .is_some_and(|current| current >= next_candidate)
        {
            return Ok(());
        }
        writer.append(
            self.clock.now_ms(),
            LedgerRecord::SequenceAdvanced {
                equipment_id,
                next_candidate,
            },
        )?;
        self.index.raise_high_water(equipment_id, next_candidate);
        Ok(())
    }

    /// Returns a document by id.
    #[must_use]
    pub fn get(&self, document_id: DocumentId) -> Option<AssignedDocument> {
        self.index.get(document_id)
    }

    /// Returns the document bound to `(equipment_id, number)`, if any.
    #[must_use]
    pub fn find_by_number(&self, equipment_id: EquipmentId, number: u64) -> Option<AssignedDocument> {
        self.index
            .id_for_number(equipment_id, number)
            .and_then(|id| self.index.get(id))
    }

    /// Returns the document committed for `(session, number)`, if any.
    #[must_use]
    pub fn find_by_session(&self, session: SessionToken, number: u64) -> Option<AssignedDocument> {
        self.index
            .session_commit(session, number)
            .and_then(|commit| self.index.get(commit.document_id))
    }

    /// Returns `true` if the number is permanently bound.
    #[must_use]
    pub fn is_assigned(&self, equipment_id: EquipmentId, number: u64) -> bool {
        self.index.id_for_number(equipment_id, number).is_some()
    }

    /// Returns every bound number of an equipment in ascending order.
    #[must_use]
    pub fn numbers_for(&self, equipment_id: EquipmentId) -> Vec<u64> {
        self.index.numbers_for(equipment_id)
    }

    /// Returns the persisted high-water mark of an equipment.
    #[must_use]
    pub fn high_water(&self, equipment_id: EquipmentId) -> Option<u64> {
        self.index.high_water(equipment_id)
    }

    /// Returns the amendment history of a document, oldest first.
    #[must_use]
    pub fn history(&self, document_id: DocumentId) -> Vec<Amendment> {
        self.index.history(document_id)
    }

    /// Returns every document matching `query`, ordered by id.
    #[must_use]
    pub fn query(&self, query: &LedgerQuery) -> Vec<AssignedDocument> {
        self.index
            .documents()
            .filter(|document| query.matches(document))
            .collect()
    }

    /// Serializes the documents matching `query` as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns a journal encoding error if serialization fails.
    pub fn export_json(&self, query: &LedgerQuery) -> Result<String> {
        serde_json::to_string_pretty(&self.query(query))
            .map_err(|e| ReservationError::Journal(e.into()))
    }

    /// Returns a copy of the journal events in `[from_sequence, to_sequence]`.
    ///
    /// # Errors
    ///
    /// See [`LedgerReplay::replay_range`].
    pub async fn journal_range(
        &self,
        from_sequence: u64,
        to_sequence: u64,
    ) -> std::result::Result<Vec<LedgerEvent>, ReplayError> {
        let writer = self.writer.lock().await;
        LedgerReplay::replay_range(&writer.journal, from_sequence, to_sequence)
            .map(|events| events.into_iter().cloned().collect())
    }

    /// Number of documents in the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if no document has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

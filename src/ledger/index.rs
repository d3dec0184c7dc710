/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! In-memory indexes over the journal.
//!
//! Readers never take the ledger's write lock: documents sit in a skip list
//! ordered by id and secondary keys live in concurrent maps. Only the ledger's
//! writer (holding its journal lock) mutates the index, always after the
//! corresponding event is durable.

use super::document::{Amendment, AssignedDocument};
use crate::types::{DocumentId, EquipmentId, SessionToken};
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

/// Case-insensitive `(equipment, name, note)` uniqueness key.
pub(crate) type NameKey = (EquipmentId, String, String);

pub(crate) fn name_key(equipment_id: EquipmentId, doc_name: &str, note: Option<&str>) -> NameKey {
    (
        equipment_id,
        doc_name.trim().to_lowercase(),
        note.map(|n| n.trim().to_lowercase()).unwrap_or_default(),
    )
}

#[derive(Debug, Clone)]
pub(crate) struct SessionCommit {
    pub document_id: DocumentId,
    pub fingerprint: String,
}

#[derive(Default)]
pub(crate) struct LedgerIndex {
    documents: SkipMap<DocumentId, AssignedDocument>,
    by_number: DashMap<(EquipmentId, u64), DocumentId>,
    by_session: DashMap<(SessionToken, u64), SessionCommit>,
    by_name: DashMap<NameKey, DocumentId>,
    high_water: DashMap<EquipmentId, u64>,
    history: DashMap<DocumentId, Vec<Amendment>>,
}

impl LedgerIndex {
    pub fn insert_committed(&self, document: AssignedDocument, fingerprint: String) {
        let id = document.id;
        self.by_number
            .insert((document.equipment_id, document.number), id);
        self.by_session.insert(
            (document.session, document.number),
            SessionCommit {
                document_id: id,
                fingerprint,
            },
        );
        self.by_name.insert(
            name_key(
                document.equipment_id,
                &document.doc_name,
                document.note.as_deref(),
            ),
            id,
        );
        self.documents.insert(id, document);
    }

    pub fn apply_amendment(&self, document: AssignedDocument, amendment: Amendment) {
        let id = document.id;
        if let Some(previous) = self.get(id) {
            let old_key = name_key(
                previous.equipment_id,
                &previous.doc_name,
                previous.note.as_deref(),
            );
            self.by_name.remove_if(&old_key, |_, owner| *owner == id);
        }
        self.by_name.insert(
            name_key(
                document.equipment_id,
                &document.doc_name,
                document.note.as_deref(),
            ),
            id,
        );
        self.documents.insert(id, document);
        self.history.entry(id).or_default().push(amendment);
    }

    /// Moves the high-water mark forward; never backwards.
    pub fn raise_high_water(&self, equipment_id: EquipmentId, next_candidate: u64) {
        self.high_water
            .entry(equipment_id)
            .and_modify(|current| *current = (*current).max(next_candidate))
            .or_insert(next_candidate);
    }

    pub fn get(&self, id: DocumentId) -> Option<AssignedDocument> {
        self.documents.get(&id).map(|entry| entry.value().clone())
    }

    pub fn id_for_number(&self, equipment_id: EquipmentId, number: u64) -> Option<DocumentId> {
        self.by_number.get(&(equipment_id, number)).map(|e| *e)
    }

    pub fn session_commit(&self, session: SessionToken, number: u64) -> Option<SessionCommit> {
        self.by_session.get(&(session, number)).map(|e| e.clone())
    }

    pub fn id_for_name(&self, key: &NameKey) -> Option<DocumentId> {
        self.by_name.get(key).map(|e| *e)
    }

    pub fn high_water(&self, equipment_id: EquipmentId) -> Option<u64> {
        self.high_water.get(&equipment_id).map(|e| *e)
    }

    pub fn numbers_for(&self, equipment_id: EquipmentId) -> Vec<u64> {
        let mut numbers: Vec<u64> = self
            .by_number
            .iter()
            .filter(|entry| entry.key().0 == equipment_id)
            .map(|entry| entry.key().1)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn history(&self, id: DocumentId) -> Vec<Amendment> {
        self.history
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn documents(&self) -> impl Iterator<Item = AssignedDocument> + '_ {
        self.documents.iter().map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn last_document_id(&self) -> Option<DocumentId> {
        self.documents.back().map(|entry| *entry.key())
    }
}

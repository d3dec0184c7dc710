/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Assigned document rows and the requests that create or amend them.

use crate::types::{DocumentId, EquipmentId, SessionToken};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Denormalized equipment fields copied onto a document for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentLabel {
    /// Equipment type.
    pub eq_type: Option<String>,
    /// Factory serial number.
    pub factory_no: Option<String>,
    /// Order number.
    pub order_no: Option<String>,
    /// Free-form label.
    pub label: Option<String>,
    /// Station number.
    pub station_no: Option<String>,
    /// Station object (project) name.
    pub station_object: Option<String>,
}

/// A number permanently bound to a named document.
///
/// Only the ledger creates these. Descriptive fields may be amended later;
/// `number`, `equipment_id` and `session` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedDocument {
    /// Ledger-assigned id.
    pub id: DocumentId,
    /// The bound document number.
    pub number: u64,
    /// Equipment the number belongs to.
    pub equipment_id: EquipmentId,
    /// Session the number was reserved in.
    pub session: SessionToken,
    /// Document name.
    pub doc_name: String,
    /// Optional note.
    pub note: Option<String>,
    /// User who performed the assignment.
    pub user: String,
    /// Commit time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Reporting copy of the equipment's descriptive fields.
    #[serde(default)]
    pub equipment_label: EquipmentLabel,
}

/// Name and note of a document about to be assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// Document name.
    pub doc_name: String,
    /// Optional note.
    pub note: Option<String>,
}

impl DocumentDraft {
    /// Creates a draft without a note.
    #[must_use]
    pub fn new(doc_name: impl Into<String>) -> Self {
        Self {
            doc_name: doc_name.into(),
            note: None,
        }
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Everything the ledger needs to bind one number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Session the number was reserved in.
    pub session: SessionToken,
    /// Number to bind.
    pub number: u64,
    /// Owning equipment.
    pub equipment_id: EquipmentId,
    /// Name and note.
    pub draft: DocumentDraft,
    /// Acting user.
    pub user: String,
}

impl CommitRequest {
    /// SHA-256 over the payload, hex encoded.
    ///
    /// Two commits for the same `(session, number)` are the same commit only
    /// when their fingerprints agree.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.equipment_id.0.to_be_bytes());
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.draft.doc_name.as_bytes());
        hasher.update([0u8]);
        match &self.draft.note {
            Some(note) => {
                hasher.update([1u8]);
                hasher.update(note.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update([0u8]);
        hasher.update(self.user.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// One field-level change recorded when a document is amended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value before the amendment.
    pub before: Option<String>,
    /// Value after the amendment.
    pub after: Option<String>,
}

/// Partial amendment of a document's descriptive fields.
///
/// `None` leaves a field untouched. For optional fields an empty string
/// clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    /// New document name.
    pub doc_name: Option<String>,
    /// New note.
    pub note: Option<String>,
    /// New equipment type.
    pub eq_type: Option<String>,
    /// New factory number.
    pub factory_no: Option<String>,
    /// New order number.
    pub order_no: Option<String>,
    /// New label.
    pub label: Option<String>,
    /// New station number.
    pub station_no: Option<String>,
    /// New station object.
    pub station_object: Option<String>,
}

impl DocumentUpdate {
    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the update to a copy of `document` and lists what changed.
    #[must_use]
    pub fn apply(&self, document: &AssignedDocument) -> (AssignedDocument, Vec<FieldChange>) {
        let mut next = document.clone();
        let mut changes = Vec::new();

        if let Some(name) = &self.doc_name {
            if *name != next.doc_name {
                changes.push(FieldChange {
                    field: "doc_name".to_string(),
                    before: Some(next.doc_name.clone()),
                    after: Some(name.clone()),
                });
                next.doc_name = name.clone();
            }
        }

        amend_optional(&mut next.note, self.note.as_deref(), "note", &mut changes);

        let label = &mut next.equipment_label;
        amend_optional(&mut label.eq_type, self.eq_type.as_deref(), "eq_type", &mut changes);
        amend_optional(
            &mut label.factory_no,
            self.factory_no.as_deref(),
            "factory_no",
            &mut changes,
        );
        amend_optional(&mut label.order_no, self.order_no.as_deref(), "order_no", &mut changes);
        amend_optional(&mut label.label, self.label.as_deref(), "label", &mut changes);
        amend_optional(
            &mut label.station_no,
            self.station_no.as_deref(),
            "station_no",
            &mut changes,
        );
        amend_optional(
            &mut label.station_object,
            self.station_object.as_deref(),
            "station_object",
            &mut changes,
        );

        (next, changes)
    }
}

fn amend_optional(
    slot: &mut Option<String>,
    requested: Option<&str>,
    field: &str,
    changes: &mut Vec<FieldChange>,
) {
    let Some(requested) = requested else {
        return;
    };
    let after = (!requested.is_empty()).then(|| requested.to_string());
    if *slot != after {
        changes.push(FieldChange {
            field: field.to_string(),
            before: slot.clone(),
            after: after.clone(),
        });
        *slot = after;
    }
}

/// Audit entry recorded for every amendment of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    /// Journal sequence number of the amendment.
    pub sequence_num: u64,
    /// When it happened, milliseconds since the Unix epoch.
    pub at_ms: u64,
    /// Who made it.
    pub user: String,
    /// What changed.
    pub changes: Vec<FieldChange>,
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Read-only filters used by reporting and export.

use super::document::AssignedDocument;
use crate::types::{EquipmentId, SessionToken};
use serde::{Deserialize, Serialize};

/// Conjunction of optional filters over assigned documents.
///
/// An empty query matches every document.
///
/// # Examples
///
/// ```
/// use docnum_rs::ledger::LedgerQuery;
/// use docnum_rs::EquipmentId;
///
/// let query = LedgerQuery::new()
///     .equipment(EquipmentId(42))
///     .user("operator")
///     .created_between(1_000, 2_000);
/// assert_eq!(query.equipment_id, Some(EquipmentId(42)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerQuery {
    /// Only documents of this equipment.
    pub equipment_id: Option<EquipmentId>,
    /// Only documents assigned by this user.
    pub user: Option<String>,
    /// Only documents created at or after this instant (ms).
    pub from_ms: Option<u64>,
    /// Only documents created strictly before this instant (ms).
    pub to_ms: Option<u64>,
    /// Only documents reserved in this session.
    pub session: Option<SessionToken>,
    /// Only documents whose station object is one of these.
    pub station_objects: Vec<String>,
    /// Case-insensitive substring of the document name.
    pub name_contains: Option<String>,
}

impl LedgerQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one equipment.
    #[must_use]
    pub fn equipment(mut self, equipment_id: EquipmentId) -> Self {
        self.equipment_id = Some(equipment_id);
        self
    }

    /// Restricts to one acting user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Restricts to `[from_ms, to_ms)`.
    #[must_use]
    pub fn created_between(mut self, from_ms: u64, to_ms: u64) -> Self {
        self.from_ms = Some(from_ms);
        self.to_ms = Some(to_ms);
        self
    }

    /// Restricts to one originating session.
    #[must_use]
    pub fn session(mut self, session: SessionToken) -> Self {
        self.session = Some(session);
        self
    }

    /// Adds an accepted station object.
    #[must_use]
    pub fn station_object(mut self, station_object: impl Into<String>) -> Self {
        self.station_objects.push(station_object.into());
        self
    }

    /// Restricts to names containing `fragment`, ignoring case.
    #[must_use]
    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    /// Returns `true` if `document` passes every filter.
    #[must_use]
    pub fn matches(&self, document: &AssignedDocument) -> bool {
        if self.equipment_id.is_some_and(|id| id != document.equipment_id) {
            return false;
        }
        if self.user.as_ref().is_some_and(|u| *u != document.user) {
            return false;
        }
        if self.from_ms.is_some_and(|from| document.created_at_ms < from) {
            return false;
        }
        if self.to_ms.is_some_and(|to| document.created_at_ms >= to) {
            return false;
        }
        if self.session.is_some_and(|s| s != document.session) {
            return false;
        }
        if !self.station_objects.is_empty() {
            let Some(object) = &document.equipment_label.station_object else {
                return false;
            };
            if !self.station_objects.iter().any(|o| o == object) {
                return false;
            }
        }
        if let Some(fragment) = &self.name_contains {
            if !document
                .doc_name
                .to_lowercase()
                .contains(&fragment.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Error type returned by every reservation, assignment and ledger operation.

use crate::ledger::JournalError;
use crate::types::{DocumentId, EquipmentId, SessionToken};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Errors surfaced to callers of the numbering engine.
///
/// Nothing here is retried internally. `Journal` is the only transient kind:
/// the caller may retry the same assignment and ledger idempotence makes the
/// retry safe.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Malformed request (zero count, duplicate numbers, out-of-range number...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more explicitly requested numbers are already reserved or assigned.
    #[error("numbers {numbers:?} are already in use for equipment {equipment_id}")]
    NumberConflict {
        /// Equipment whose sequence was targeted.
        equipment_id: EquipmentId,
        /// Every requested number that was already used.
        numbers: Vec<u64>,
    },

    /// The session token is unknown, closed, or expired.
    #[error("unknown session {0}")]
    UnknownSession(SessionToken),

    /// The session exists but no longer accepts this operation.
    #[error("session {0} is closed")]
    SessionClosed(SessionToken),

    /// The number is not reserved where the caller claims it is.
    #[error("number {number} is not reserved for equipment {equipment_id}")]
    UnknownNumber {
        /// Equipment the number was looked up on.
        equipment_id: EquipmentId,
        /// The number.
        number: u64,
    },

    /// The number is already bound to a document.
    #[error("number {number} of equipment {equipment_id} is already assigned")]
    AlreadyAssigned {
        /// Equipment owning the number.
        equipment_id: EquipmentId,
        /// The number.
        number: u64,
    },

    /// The bounded search for free numbers ran out of candidates.
    #[error(
        "number space exhausted for equipment {equipment_id}: requested {requested}, found {found}"
    )]
    Exhaustion {
        /// Equipment whose sequence was searched.
        equipment_id: EquipmentId,
        /// Numbers requested.
        requested: usize,
        /// Numbers that could have been handed out.
        found: usize,
    },

    /// Unknown document id.
    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// A document with the same name and note already exists for the equipment.
    #[error("document \"{doc_name}\" is already registered for equipment {equipment_id}")]
    DuplicateDocument {
        /// Equipment the document belongs to.
        equipment_id: EquipmentId,
        /// The colliding document name.
        doc_name: String,
    },

    /// The actor is not allowed to perform the operation.
    #[error("user {user} may not {operation}")]
    PermissionDenied {
        /// Acting user.
        user: String,
        /// Short name of the refused operation.
        operation: &'static str,
    },

    /// The durable journal rejected a write.
    #[error("ledger journal failure: {0}")]
    Journal(#[from] JournalError),

    /// An equipment worker has stopped and can no longer accept commands.
    #[error("allocator worker has been shut down")]
    Shutdown,
}

impl ReservationError {
    /// Shorthand for [`ReservationError::InvalidArgument`].
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Returns `true` for failures a caller may retry unchanged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Journal(_) | Self::Shutdown)
    }
}

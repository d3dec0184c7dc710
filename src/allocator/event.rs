/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Allocator event types.
//!
//! Every state change of an equipment sequence is reported to the
//! registered listeners as an [`AllocatorEvent`]. Rejected commands produce
//! no event.

use crate::types::{DocumentId, EquipmentId};
use serde::{Deserialize, Serialize};

/// What changed in a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocationKind {
    /// Numbers reserved by auto-increment.
    Sequential {
        /// Reserved numbers, ascending.
        numbers: Vec<u64>,
    },
    /// Numbers reserved by explicit request.
    Specific {
        /// Reserved numbers, in request order.
        numbers: Vec<u64>,
    },
    /// Numbers reserved by a golden search.
    Golden {
        /// Reserved numbers, ascending.
        numbers: Vec<u64>,
    },
    /// Reserved numbers returned to the pool.
    Released {
        /// Freed numbers.
        numbers: Vec<u64>,
    },
    /// A reserved number was bound to a document.
    Assigned {
        /// The bound number.
        number: u64,
        /// The new document.
        document_id: DocumentId,
    },
    /// A reservation was dropped because its commit never reached the journal.
    RolledBack {
        /// The freed number.
        number: u64,
    },
}

/// Event emitted after an equipment worker applies a command.
///
/// # Examples
///
/// ```
/// use docnum_rs::allocator::{AllocationKind, AllocatorEvent};
/// use docnum_rs::EquipmentId;
///
/// let event = AllocatorEvent::new(
///     EquipmentId(42),
///     1,
///     1_700_000_000_000,
///     AllocationKind::Sequential { numbers: vec![1, 2, 3] },
/// );
/// assert_eq!(event.sequence_num, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorEvent {
    /// Equipment whose sequence changed.
    pub equipment_id: EquipmentId,

    /// Per-equipment sequence number, starting at 1 with no gaps.
    pub sequence_num: u64,

    /// Millisecond timestamp when the change was applied.
    pub timestamp_ms: u64,

    /// The change.
    pub kind: AllocationKind,
}

impl AllocatorEvent {
    /// Creates a new allocator event.
    #[must_use]
    pub fn new(
        equipment_id: EquipmentId,
        sequence_num: u64,
        timestamp_ms: u64,
        kind: AllocationKind,
    ) -> Self {
        Self {
            equipment_id,
            sequence_num,
            timestamp_ms,
            kind,
        }
    }
}

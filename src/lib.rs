/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # docnum-rs
//!
//! Reservation-then-assignment engine for permanently unique equipment
//! document numbers.
//!
//! A user first *reserves* one or more numbers for an equipment, which opens
//! a TTL-bound session, and then *assigns* each reserved number to a document.
//! Assignments are final; reservations that are never used are reclaimed and
//! the numbers become available again.
//!
//! ## Components
//!
//! - [`allocator`]: one single-writer worker per equipment owning its number
//!   sequence (sequential, specific and golden allocation)
//! - [`session`]: reservation sessions with `Active → Draining → Closed`
//!   lifecycle and TTL expiry
//! - [`ledger`]: idempotent, append-only record of assigned documents over a
//!   durable [`Journal`](ledger::Journal)
//! - [`sweeper`]: periodic and on-demand reclamation of expired sessions
//! - [`engine`]: the [`NumberingEngine`] facade tying the above together
//!
//! ## Guarantees
//!
//! - A number is never assigned to two documents of the same equipment
//! - An assigned number is never released
//! - Committing the same `(session, number)` with the same payload twice
//!   yields one document
//! - Sequential allocation per equipment is strictly increasing
//!
//! ## Example
//!
//! ```
//! use docnum_rs::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = NumberingEngine::in_memory(EngineConfig::default(), Arc::new(SystemClock))?;
//! let operator = Actor::user("operator");
//!
//! let session = engine.reserve(&operator, EquipmentId(42), 3, None).await?;
//! assert_eq!(session.unassigned(), vec![1, 2, 3]);
//!
//! let doc = engine
//!     .assign(&operator, session.token, 1, DocumentDraft::new("Single-line diagram"))
//!     .await?;
//! assert_eq!(doc.number, 1);
//!
//! // Numbers 2 and 3 go back to the pool.
//! assert_eq!(engine.cancel(session.token).await?, vec![2, 3]);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod numbering;
pub mod session;
pub mod sweeper;
pub mod types;

pub use allocator::{AllocationKind, AllocatorEvent, SequenceAllocator, SequenceSnapshot};
pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, NumberingEngine};
pub use error::{ReservationError, Result};
pub use ledger::{AssignedDocument, AssignmentLedger, DocumentDraft, DocumentUpdate, LedgerQuery};
pub use numbering::{GoldenCriteria, GoldenFilter, format_doc_no};
pub use session::{NumberRequest, SessionManager, SessionSnapshot, SessionState};
pub use sweeper::{ReclamationSweeper, SweepReport};
pub use types::{Actor, DocumentId, EquipmentId, SessionToken};

/// Commonly used types.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::EngineConfig;
    pub use crate::engine::NumberingEngine;
    pub use crate::error::ReservationError;
    pub use crate::ledger::{DocumentDraft, DocumentUpdate, LedgerQuery};
    pub use crate::numbering::{GoldenCriteria, GoldenFilter};
    pub use crate::session::{NumberRequest, SessionSnapshot, SessionState};
    pub use crate::types::{Actor, DocumentId, EquipmentId, SessionToken};
}

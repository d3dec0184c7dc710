/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Assignment ledger: the durable record of bound document numbers.
//!
//! # Architecture
//!
//! - Every mutation is an event appended to a [`Journal`] before it becomes
//!   visible
//! - Each event carries a gap-free sequence number and a millisecond timestamp
//! - In-memory indexes are rebuilt on open by [`LedgerReplay`]
//! - Commits are idempotent per `(session, number)` and payload fingerprint
//! - Amendments keep a field-level audit trail
//!
//! # Examples
//!
//! ```no_run
//! use docnum_rs::clock::SystemClock;
//! use docnum_rs::ledger::{AssignmentLedger, FileJournal, LedgerQuery};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let journal = FileJournal::open("data/ledger.journal")?;
//! let ledger = AssignmentLedger::open(journal, Arc::new(SystemClock))?;
//! println!("{}", ledger.export_json(&LedgerQuery::new())?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod document;
#[cfg(feature = "journal")]
pub mod file;
mod index;
pub mod journal;
pub mod query;
pub mod replay;

#[cfg(test)]
pub(crate) mod tests;

pub use self::core::AssignmentLedger;
pub use document::{
    Amendment, AssignedDocument, CommitRequest, DocumentDraft, DocumentUpdate, EquipmentLabel,
    FieldChange,
};
#[cfg(feature = "journal")]
pub use file::FileJournal;
pub use journal::{InMemoryJournal, Journal, JournalError, LedgerEvent, LedgerRecord};
pub use query::LedgerQuery;
pub use replay::{LedgerReplay, ReplayError};

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Sequence allocator: per-equipment number sequences behind single-writer
//! workers.
//!
//! # Architecture
//!
//! - Requests for an equipment are sent over an async channel to that
//!   equipment's worker task
//! - The worker owns the [`NumberSequence`] and applies commands one at a time
//! - Replies come back on a oneshot channel carried by the command
//! - Every change is emitted to registered listeners as an [`AllocatorEvent`]
//!   with a gap-free per-equipment sequence number
//! - Workers are spawned lazily and seeded from the ledger, so assigned
//!   numbers and the auto-increment high-water mark survive a restart
//!
//! # Examples
//!
//! ```no_run
//! use docnum_rs::allocator::SequenceAllocator;
//! use docnum_rs::EquipmentId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let allocator = SequenceAllocator::in_memory();
//!
//! allocator.add_listener(|event| {
//!     println!("Event {} for {}: {:?}", event.sequence_num, event.equipment_id, event.kind);
//! });
//!
//! allocator.allocate_specific(EquipmentId(42), vec![50]).await?;
//! let numbers = allocator.allocate_sequential(EquipmentId(42), 3).await?;
//! allocator.release(EquipmentId(42), numbers).await?;
//! # Ok(())
//! # }
//! ```

mod command;
pub mod core;
pub mod event;
pub mod sequence;
mod worker;

#[cfg(test)]
mod tests;

pub use self::core::SequenceAllocator;
pub use event::{AllocationKind, AllocatorEvent};
pub use sequence::{NumberSequence, SequenceSnapshot};

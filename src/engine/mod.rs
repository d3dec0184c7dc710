/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! The numbering engine.
//!
//! [`NumberingEngine`] wires the ledger, allocator, sessions and sweeper
//! together and gates admin-only operations on [`Actor::is_admin`].
//!
//! # Examples
//!
//! ```
//! use docnum_rs::clock::SystemClock;
//! use docnum_rs::config::EngineConfig;
//! use docnum_rs::engine::NumberingEngine;
//! use docnum_rs::ledger::DocumentDraft;
//! use docnum_rs::types::{Actor, EquipmentId};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = NumberingEngine::in_memory(EngineConfig::default(), Arc::new(SystemClock))?;
//! let operator = Actor::user("operator");
//!
//! let session = engine.reserve(&operator, EquipmentId(42), 2, None).await?;
//! let document = engine
//!     .assign_next(&operator, session.token, DocumentDraft::new("Wiring diagram"))
//!     .await?;
//! assert_eq!(engine.format_number(document.number), "УТЗ-000001");
//! # Ok(())
//! # }
//! ```
//!
//! [`Actor::is_admin`]: crate::types::Actor::is_admin

pub mod core;

#[cfg(test)]
mod tests;

pub use self::core::{EngineError, NumberingEngine};

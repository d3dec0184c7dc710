/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Shared fixtures for session tests.

use crate::allocator::SequenceAllocator;
use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::ledger::{AssignmentLedger, InMemoryJournal, Journal};
use crate::session::SessionManager;
use std::sync::Arc;

pub const START_MS: u64 = 1_000_000;

/// Builds a session manager over `journal` with a manual clock at [`START_MS`].
pub fn manager_over<J: Journal>(
    journal: J,
    config: &EngineConfig,
) -> (SessionManager<J>, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let ledger = match AssignmentLedger::open(journal, shared.clone()) {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => panic!("fresh journal must open: {e}"),
    };
    let allocator = Arc::new(SequenceAllocator::new(ledger, config, shared.clone()));
    (SessionManager::new(allocator, config, shared), clock)
}

/// In-memory manager with default configuration.
pub fn manager() -> (SessionManager, ManualClock) {
    manager_over(InMemoryJournal::new(), &EngineConfig::default())
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Journal test double that can be told to fail.

use crate::ledger::journal::{InMemoryJournal, Journal, JournalError, LedgerEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory journal whose appends fail while its switch is on.
#[derive(Debug, Default)]
pub struct FlakyJournal {
    inner: InMemoryJournal,
    failing: Arc<AtomicBool>,
}

impl FlakyJournal {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: InMemoryJournal::new(),
                failing: failing.clone(),
            },
            failing,
        )
    }
}

impl Journal for FlakyJournal {
    fn append(&mut self, event: LedgerEvent) -> Result<(), JournalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(JournalError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.append(event)
    }

    fn read_from(&self, from_sequence: u64) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.inner.read_from(from_sequence)
    }

    fn read_range(
        &self,
        from_sequence: u64,
        to_sequence: u64,
    ) -> impl Iterator<Item = &LedgerEvent> + '_ {
        self.inner.read_range(from_sequence, to_sequence)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn last_sequence(&self) -> Option<u64> {
        self.inner.last_sequence()
    }
}

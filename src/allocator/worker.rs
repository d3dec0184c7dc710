/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Equipment worker: the single writer of one [`NumberSequence`].
//!
//! The worker receives commands in channel order, applies each one to its
//! sequence, emits an event for every change, and answers through the
//! command's reply channel. Commits run inside the loop too, so a release
//! and a commit for the same number can never interleave.

use super::command::AllocatorCommand;
use super::core::{Listeners, Settings};
use super::event::{AllocationKind, AllocatorEvent};
use super::sequence::NumberSequence;
use crate::clock::Clock;
use crate::error::{ReservationError, Result};
use crate::ledger::{AssignedDocument, AssignmentLedger, CommitRequest, Journal};
use crate::numbering::GoldenFilter;
use crate::types::SessionToken;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(crate) struct SequenceWorker<J: Journal> {
    sequence: NumberSequence,
    ledger: Arc<AssignmentLedger<J>>,
    clock: Arc<dyn Clock>,
    listeners: Listeners,
    settings: Settings,
    event_sequence: u64,
}

impl<J: Journal> SequenceWorker<J> {
    pub(crate) fn new(
        sequence: NumberSequence,
        ledger: Arc<AssignmentLedger<J>>,
        clock: Arc<dyn Clock>,
        listeners: Listeners,
        settings: Settings,
    ) -> Self {
        Self {
            sequence,
            ledger,
            clock,
            listeners,
            settings,
            event_sequence: 1,
        }
    }

    /// Runs until every sender is dropped.
    pub(crate) async fn run_loop(mut self, mut command_rx: mpsc::Receiver<AllocatorCommand>) {
        while let Some(command) = command_rx.recv().await {
            self.execute(command).await;
        }
        debug!(
            equipment_id = %self.sequence.equipment_id(),
            "equipment worker stopped"
        );
    }

    async fn execute(&mut self, command: AllocatorCommand) {
        match command {
            AllocatorCommand::Sequential {
                count,
                skip_golden,
                owner,
                reply,
            } => {
                let result = self.allocate_sequential(count, skip_golden, owner).await;
                let _ = reply.send(result);
            }
            AllocatorCommand::Specific {
                numbers,
                owner,
                reply,
            } => {
                let result = self.allocate_specific(&numbers, owner);
                let _ = reply.send(result);
            }
            AllocatorCommand::Golden {
                count,
                filter,
                owner,
                reply,
            } => {
                let result = self.allocate_golden(count, &filter, owner);
                let _ = reply.send(result);
            }
            AllocatorCommand::SuggestGolden {
                count,
                filter,
                reply,
            } => {
                let found = self
                    .sequence
                    .golden_candidates(&filter, self.settings.golden_search_window)
                    .take(count)
                    .collect();
                let _ = reply.send(found);
            }
            AllocatorCommand::Claim {
                numbers,
                owner,
                reply,
            } => {
                let _ = reply.send(self.sequence.claim(&numbers, owner));
            }
            AllocatorCommand::Release {
                numbers,
                owner,
                reply,
            } => {
                let released = self.release(&numbers, owner);
                let _ = reply.send(released);
            }
            AllocatorCommand::Commit { request, reply } => {
                let result = self.commit(request).await;
                let _ = reply.send(result);
            }
            AllocatorCommand::Snapshot { reply } => {
                let _ = reply.send(self.sequence.snapshot());
            }
        }
    }

    async fn allocate_sequential(
        &mut self,
        count: usize,
        skip_golden: bool,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        let skip = if skip_golden {
            self.settings.sequential_skip
        } else {
            None
        };
        let numbers = self.sequence.next_free(count, skip)?;
        let next_candidate = numbers
            .last()
            .map_or(self.sequence.next_candidate(), |highest| highest + 1);

        // The high-water mark must be durable before any caller sees the numbers.
        self.ledger
            .record_high_water(self.sequence.equipment_id(), next_candidate)
            .await?;
        self.sequence.take_sequential(&numbers, owner);

        debug!(
            equipment_id = %self.sequence.equipment_id(),
            count,
            next_candidate,
            "sequential numbers reserved"
        );
        self.emit(AllocationKind::Sequential {
            numbers: numbers.clone(),
        });
        Ok(numbers)
    }

    fn allocate_specific(
        &mut self,
        numbers: &[u64],
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        let taken = self.sequence.take_specific(numbers, owner)?;
        debug!(
            equipment_id = %self.sequence.equipment_id(),
            count = taken.len(),
            "specific numbers reserved"
        );
        self.emit(AllocationKind::Specific {
            numbers: taken.clone(),
        });
        Ok(taken)
    }

    fn allocate_golden(
        &mut self,
        count: usize,
        filter: &GoldenFilter,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        let numbers =
            self.sequence
                .find_golden(count, filter, self.settings.golden_search_window)?;
        self.sequence.take(&numbers, owner);
        debug!(
            equipment_id = %self.sequence.equipment_id(),
            count,
            "golden numbers reserved"
        );
        self.emit(AllocationKind::Golden {
            numbers: numbers.clone(),
        });
        Ok(numbers)
    }

    fn release(&mut self, numbers: &[u64], owner: Option<SessionToken>) -> Vec<u64> {
        let released = self.sequence.release(numbers, owner);
        if !released.is_empty() {
            debug!(
                equipment_id = %self.sequence.equipment_id(),
                count = released.len(),
                "numbers released"
            );
            self.emit(AllocationKind::Released {
                numbers: released.clone(),
            });
        }
        released
    }

    async fn commit(&mut self, request: CommitRequest) -> Result<AssignedDocument> {
        let equipment_id = self.sequence.equipment_id();
        let number = request.number;
        let owner = self.sequence.owner_of(number);
        let foreign = owner.is_some_and(|held| held != request.session);
        if !self.sequence.is_used(number) || foreign {
            return Err(ReservationError::UnknownNumber {
                equipment_id,
                number,
            });
        }
        let retry = self.sequence.is_assigned(number);

        match self.ledger.commit(request).await {
            Ok(document) => {
                if !retry {
                    self.sequence.mark_assigned(number);
                    self.emit(AllocationKind::Assigned {
                        number,
                        document_id: document.id,
                    });
                }
                Ok(document)
            }
            Err(e @ ReservationError::Journal(_)) if !retry => {
                warn!(
                    %equipment_id,
                    number,
                    error = %e,
                    "commit did not reach the journal, releasing reservation"
                );
                if !self.sequence.release(&[number], owner).is_empty() {
                    self.emit(AllocationKind::RolledBack { number });
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn emit(&mut self, kind: AllocationKind) {
        let event = AllocatorEvent::new(
            self.sequence.equipment_id(),
            self.event_sequence,
            self.clock.now_ms(),
            kind,
        );
        self.event_sequence += 1;

        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener(&event);
            }
        }
    }
}

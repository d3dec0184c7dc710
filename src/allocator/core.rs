/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Core allocator implementation.
//!
//! [`SequenceAllocator`] routes every request for an equipment to that
//! equipment's worker task, spawning the worker on first use. Workers for
//! different equipment never wait on each other.

use super::command::{AllocatorCommand, Reply};
use super::event::AllocatorEvent;
use super::sequence::{NumberSequence, SequenceSnapshot};
use super::worker::SequenceWorker;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ReservationError, Result};
use crate::ledger::{AssignedDocument, AssignmentLedger, CommitRequest, InMemoryJournal, Journal};
use crate::numbering::{GoldenCriteria, GoldenFilter};
use crate::types::{Actor, EquipmentId, SessionToken};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Type alias for event listener functions.
type EventListener = Arc<dyn Fn(&AllocatorEvent) + Send + Sync>;

pub(crate) type Listeners = Arc<RwLock<Vec<EventListener>>>;

/// Allocation limits shared by every worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub base_start: u64,
    pub max_number: u64,
    pub golden_search_window: u64,
    pub sequential_skip: Option<GoldenCriteria>,
    pub channel_capacity: usize,
}

impl From<&EngineConfig> for Settings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            base_start: config.base_start,
            max_number: config.max_number,
            golden_search_window: config.golden_search_window,
            sequential_skip: config
                .reserve_golden_for_admins
                .then_some(config.default_golden),
            channel_capacity: config.worker_channel_capacity,
        }
    }
}

/// Hands out document numbers, one single-writer worker per equipment.
///
/// Two concurrent sequential allocations for the same equipment never
/// overlap; allocations for different equipment run in parallel.
///
/// # Examples
///
/// ```
/// use docnum_rs::allocator::SequenceAllocator;
/// use docnum_rs::EquipmentId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let allocator = SequenceAllocator::in_memory();
/// let first = allocator.allocate_sequential(EquipmentId(42), 3).await?;
/// let second = allocator.allocate_sequential(EquipmentId(42), 1).await?;
/// assert_eq!(first, vec![1, 2, 3]);
/// assert_eq!(second, vec![4]);
/// # Ok(())
/// # }
/// ```
pub struct SequenceAllocator<J: Journal = InMemoryJournal> {
    ledger: Arc<AssignmentLedger<J>>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    workers: DashMap<EquipmentId, mpsc::Sender<AllocatorCommand>>,
    listeners: Listeners,
}

impl SequenceAllocator<InMemoryJournal> {
    /// Creates an allocator over an empty in-memory ledger with default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(AssignmentLedger::in_memory()),
            &EngineConfig::default(),
            Arc::new(SystemClock),
        )
    }
}

impl<J: Journal> SequenceAllocator<J> {
    /// Creates an allocator that records assignments and high-water marks in
    /// `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<AssignmentLedger<J>>, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            settings: Settings::from(config),
            workers: DashMap::new(),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers an event listener.
    ///
    /// Listeners run on the worker task, in event order for each equipment,
    /// and see events of workers spawned before and after registration.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&AllocatorEvent) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(Arc::new(listener));
        }
    }

    /// Reserves the next `count` free numbers, skipping golden numbers when
    /// they are kept for admins. No session holds the result.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] when `count` is zero
    /// - [`ReservationError::Exhaustion`] when the number range runs out,
    ///   including a `count` larger than what is left of it
    /// - [`ReservationError::Journal`] if the high-water mark could not be persisted
    pub async fn allocate_sequential(
        &self,
        equipment_id: EquipmentId,
        count: usize,
    ) -> Result<Vec<u64>> {
        self.sequential(equipment_id, count, true, None).await
    }

    /// Reserves sequential numbers held by session `owner`. Admins may
    /// receive golden numbers.
    ///
    /// # Errors
    ///
    /// Same as [`allocate_sequential`](Self::allocate_sequential).
    pub async fn allocate_sequential_for(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        actor: &Actor,
        owner: SessionToken,
    ) -> Result<Vec<u64>> {
        self.sequential(equipment_id, count, !actor.is_admin, Some(owner))
            .await
    }

    async fn sequential(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        skip_golden: bool,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        self.request(equipment_id, |reply| AllocatorCommand::Sequential {
            count,
            skip_golden,
            owner,
            reply,
        })
        .await?
    }

    /// Reserves exactly `numbers`, all or nothing.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] for an empty list, duplicates,
    ///   or numbers out of range
    /// - [`ReservationError::NumberConflict`] if any number is already used
    pub async fn allocate_specific(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
    ) -> Result<Vec<u64>> {
        self.specific(equipment_id, numbers, None).await
    }

    /// Reserves exactly `numbers` for session `owner`, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`allocate_specific`](Self::allocate_specific).
    pub async fn allocate_specific_for(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        owner: SessionToken,
    ) -> Result<Vec<u64>> {
        self.specific(equipment_id, numbers, Some(owner)).await
    }

    async fn specific(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        self.request(equipment_id, |reply| AllocatorCommand::Specific {
            numbers,
            owner,
            reply,
        })
        .await?
    }

    /// Reserves `count` free numbers selected by `filter`, searching forward
    /// from the auto-increment position.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] when `count` is zero
    /// - [`ReservationError::Exhaustion`] if the search window holds too few
    pub async fn allocate_golden(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        filter: GoldenFilter,
    ) -> Result<Vec<u64>> {
        self.golden(equipment_id, count, filter, None).await
    }

    /// Reserves golden numbers for session `owner`.
    ///
    /// # Errors
    ///
    /// Same as [`allocate_golden`](Self::allocate_golden).
    pub async fn allocate_golden_for(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        filter: GoldenFilter,
        owner: SessionToken,
    ) -> Result<Vec<u64>> {
        self.golden(equipment_id, count, filter, Some(owner)).await
    }

    async fn golden(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        filter: GoldenFilter,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        self.request(equipment_id, |reply| AllocatorCommand::Golden {
            count,
            filter,
            owner,
            reply,
        })
        .await?
    }

    /// Lists up to `count` free numbers `filter` would select, without
    /// reserving them.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the worker is gone.
    pub async fn suggest_golden(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        filter: GoldenFilter,
    ) -> Result<Vec<u64>> {
        self.request(equipment_id, |reply| AllocatorCommand::SuggestGolden {
            count,
            filter,
            reply,
        })
        .await
    }

    /// Returns reserved numbers no session holds to the pool and reports
    /// which were freed.
    ///
    /// Assigned, unknown and session-held numbers are skipped, so releasing
    /// twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the worker is gone.
    pub async fn release(&self, equipment_id: EquipmentId, numbers: Vec<u64>) -> Result<Vec<u64>> {
        self.release_held(equipment_id, numbers, None).await
    }

    /// Returns numbers held by session `owner` to the pool. Numbers held by
    /// anyone else are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the worker is gone.
    pub async fn release_for(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        owner: SessionToken,
    ) -> Result<Vec<u64>> {
        self.release_held(equipment_id, numbers, Some(owner)).await
    }

    async fn release_held(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }
        self.request(equipment_id, |reply| AllocatorCommand::Release {
            numbers,
            owner,
            reply,
        })
        .await
    }

    /// Hands reserved numbers no session holds over to session `owner`.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownNumber`] if a number is not reserved,
    ///   already assigned, or held by another session; nothing is claimed
    /// - [`ReservationError::Shutdown`] if the worker is gone
    pub async fn claim(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        owner: SessionToken,
    ) -> Result<()> {
        self.request(equipment_id, |reply| AllocatorCommand::Claim {
            numbers,
            owner,
            reply,
        })
        .await?
    }

    /// Binds a reserved number through the ledger on the equipment's worker.
    ///
    /// If the ledger write fails, the number is released before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownNumber`] if the number is not reserved,
    ///   or is held by a session other than the request's
    /// - any error of [`AssignmentLedger::commit`]
    pub async fn commit(&self, request: CommitRequest) -> Result<AssignedDocument> {
        self.request(request.equipment_id, |reply| AllocatorCommand::Commit {
            request,
            reply,
        })
        .await?
    }

    /// Returns a copy of an equipment's sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the worker is gone.
    pub async fn snapshot(&self, equipment_id: EquipmentId) -> Result<SequenceSnapshot> {
        self.request(equipment_id, |reply| AllocatorCommand::Snapshot { reply })
            .await
    }

    /// The ledger this allocator commits to.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AssignmentLedger<J>> {
        &self.ledger
    }

    /// Number of equipment workers spawned so far.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    async fn request<T>(
        &self,
        equipment_id: EquipmentId,
        build: impl FnOnce(Reply<T>) -> AllocatorCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        let sender = self.sender(equipment_id);
        sender
            .send(build(tx))
            .await
            .map_err(|_| ReservationError::Shutdown)?;
        rx.await.map_err(|_| ReservationError::Shutdown)
    }

    fn sender(&self, equipment_id: EquipmentId) -> mpsc::Sender<AllocatorCommand> {
        self.workers
            .entry(equipment_id)
            .or_insert_with(|| self.spawn_worker(equipment_id))
            .clone()
    }

    fn spawn_worker(&self, equipment_id: EquipmentId) -> mpsc::Sender<AllocatorCommand> {
        let high_water = self.ledger.high_water(equipment_id);
        let assigned = self.ledger.numbers_for(equipment_id);
        let next_candidate = self
            .settings
            .base_start
            .max(high_water.unwrap_or(0));

        info!(
            %equipment_id,
            next_candidate,
            assigned = assigned.len(),
            "spawning equipment worker"
        );

        let sequence = NumberSequence::new(equipment_id, next_candidate, self.settings.max_number)
            .with_assigned(assigned);
        let worker = SequenceWorker::new(
            sequence,
            self.ledger.clone(),
            self.clock.clone(),
            self.listeners.clone(),
            self.settings,
        );

        let (command_tx, command_rx) = mpsc::channel(self.settings.channel_capacity);
        tokio::spawn(worker.run_loop(command_rx));
        command_tx
    }
}

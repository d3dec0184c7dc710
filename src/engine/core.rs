/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

use crate::allocator::{AllocatorEvent, SequenceAllocator, SequenceSnapshot};
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::error::{ReservationError, Result};
use crate::ledger::{
    Amendment, AssignedDocument, AssignmentLedger, DocumentDraft, DocumentUpdate, InMemoryJournal,
    Journal, JournalError, LedgerQuery, ReplayError,
};
use crate::numbering::{GoldenFilter, format_doc_no};
use crate::session::{NumberRequest, SessionManager, SessionSnapshot};
use crate::sweeper::{ReclamationSweeper, SweepReport};
use crate::types::{Actor, DocumentId, EquipmentId, SessionToken};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors raised while building an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The journal could not be opened.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The journal holds inconsistent events.
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Entry point of the crate: reservation, assignment and reporting for
/// already-authenticated actors.
///
/// Owns the ledger, the per-equipment allocators, the session registry and
/// the sweeper. Cloning the inner `Arc`s is how components share state; the
/// engine itself is usually wrapped in an `Arc` by the caller.
pub struct NumberingEngine<J: Journal = InMemoryJournal> {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ledger: Arc<AssignmentLedger<J>>,
    allocator: Arc<SequenceAllocator<J>>,
    sessions: Arc<SessionManager<J>>,
    sweeper: Arc<ReclamationSweeper<J>>,
}

impl NumberingEngine<InMemoryJournal> {
    /// Creates an engine whose ledger lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` fails validation.
    pub fn in_memory(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, EngineError> {
        Self::open(config, InMemoryJournal::new(), clock)
    }
}

#[cfg(feature = "journal")]
impl NumberingEngine<crate::ledger::FileJournal> {
    /// Opens (or creates) a file-backed journal at `path` and builds an
    /// engine over it.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`].
    pub fn open_file(
        config: EngineConfig,
        path: impl AsRef<std::path::Path>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, EngineError> {
        let journal = crate::ledger::FileJournal::open(path)?;
        Self::open(config, journal, clock)
    }
}

impl<J: Journal> NumberingEngine<J> {
    /// Builds an engine over `journal`, replaying whatever it already holds.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] if `config` fails validation
    /// - [`EngineError::Replay`] if the journal is inconsistent
    pub fn open(
        config: EngineConfig,
        journal: J,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, EngineError> {
        config.validate()?;
        let ledger = Arc::new(AssignmentLedger::open(journal, clock.clone())?);
        let allocator = Arc::new(SequenceAllocator::new(
            ledger.clone(),
            &config,
            clock.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            allocator.clone(),
            &config,
            clock.clone(),
        ));
        let sweeper = Arc::new(ReclamationSweeper::new(
            sessions.clone(),
            clock.clone(),
            config.sweep_interval(),
        ));

        info!(
            documents = ledger.len(),
            default_ttl_seconds = config.default_ttl_seconds,
            max_number = config.max_number,
            "numbering engine ready"
        );
        Ok(Self {
            config,
            clock,
            ledger,
            allocator,
            sessions,
            sweeper,
        })
    }

    /// Reserves the next `count` numbers for `equipment_id` and opens a
    /// session holding them.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::reserve`].
    pub async fn reserve(
        &self,
        actor: &Actor,
        equipment_id: EquipmentId,
        count: usize,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        self.reserve_request(actor, equipment_id, NumberRequest::Sequential(count), ttl)
            .await
    }

    /// Reserves exactly `numbers`. Admin only.
    ///
    /// # Errors
    ///
    /// [`ReservationError::PermissionDenied`] for non-admins, otherwise see
    /// [`SequenceAllocator::allocate_specific`].
    pub async fn reserve_specific(
        &self,
        actor: &Actor,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        self.reserve_request(actor, equipment_id, NumberRequest::Specific(numbers), ttl)
            .await
    }

    /// Reserves `count` golden numbers. Admin only.
    ///
    /// `filter` defaults to the configured golden criteria.
    ///
    /// # Errors
    ///
    /// [`ReservationError::PermissionDenied`] for non-admins, otherwise see
    /// [`SequenceAllocator::allocate_golden`].
    pub async fn reserve_golden(
        &self,
        actor: &Actor,
        equipment_id: EquipmentId,
        count: usize,
        filter: Option<GoldenFilter>,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        let request = NumberRequest::Golden {
            count,
            filter: self.golden_filter(filter),
        };
        self.reserve_request(actor, equipment_id, request, ttl).await
    }

    async fn reserve_request(
        &self,
        actor: &Actor,
        equipment_id: EquipmentId,
        request: NumberRequest,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        if request.is_privileged() {
            self.require_admin(actor, "reserve specific or golden numbers")?;
        }
        let sessions = &self.sessions;
        self.reclaiming(move || sessions.reserve(equipment_id, request.clone(), actor, ttl))
            .await
    }

    /// Previews up to `count` free golden numbers without reserving them.
    ///
    /// # Errors
    ///
    /// [`ReservationError::Shutdown`] if the equipment worker is gone.
    pub async fn suggest_golden(
        &self,
        equipment_id: EquipmentId,
        count: usize,
        filter: Option<GoldenFilter>,
    ) -> Result<Vec<u64>> {
        self.allocator
            .suggest_golden(equipment_id, count, self.golden_filter(filter))
            .await
    }

    /// Binds `number` of the session to a new document.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::assign_one`].
    pub async fn assign(
        &self,
        actor: &Actor,
        token: SessionToken,
        number: u64,
        draft: DocumentDraft,
    ) -> Result<AssignedDocument> {
        self.sessions
            .assign_one(token, number, draft, &actor.user)
            .await
    }

    /// Binds the lowest unassigned number of the session.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::assign_next`].
    pub async fn assign_next(
        &self,
        actor: &Actor,
        token: SessionToken,
        draft: DocumentDraft,
    ) -> Result<AssignedDocument> {
        self.sessions.assign_next(token, draft, &actor.user).await
    }

    /// Reserves more numbers for an active session. Specific and golden
    /// requests are admin only.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::add_numbers`].
    pub async fn add_numbers(
        &self,
        actor: &Actor,
        token: SessionToken,
        request: NumberRequest,
    ) -> Result<Vec<u64>> {
        if request.is_privileged() {
            self.require_admin(actor, "add specific or golden numbers")?;
        }
        let sessions = &self.sessions;
        self.reclaiming(move || sessions.add_numbers(token, request.clone(), actor))
            .await
    }

    /// Resets the session's TTL clock.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::touch`].
    pub async fn touch(&self, token: SessionToken) -> Result<SessionSnapshot> {
        self.sessions.touch(token).await
    }

    /// Drops one unassigned number from the session.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::release_number`].
    pub async fn release_number(&self, token: SessionToken, number: u64) -> Result<()> {
        self.sessions.release_number(token, number).await
    }

    /// Closes the session and frees its unassigned numbers.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::cancel`].
    pub async fn cancel(&self, token: SessionToken) -> Result<Vec<u64>> {
        self.sessions.cancel(token).await
    }

    /// Frees reserved numbers of an equipment. Admin only.
    ///
    /// A number still held by a live session is withdrawn from that session,
    /// so it can never sit in two sessions once reserved again.
    ///
    /// # Errors
    ///
    /// [`ReservationError::PermissionDenied`] for non-admins, otherwise see
    /// [`SessionManager::release_numbers`].
    pub async fn release(
        &self,
        actor: &Actor,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
    ) -> Result<Vec<u64>> {
        self.require_admin(actor, "release numbers")?;
        let released = self.sessions.release_numbers(equipment_id, numbers).await?;
        info!(%equipment_id, user = %actor.user, count = released.len(), "numbers released by admin");
        Ok(released)
    }

    /// Amends a document's descriptive fields. Admin only.
    ///
    /// # Errors
    ///
    /// [`ReservationError::PermissionDenied`] for non-admins, otherwise see
    /// [`AssignmentLedger::update`].
    pub async fn update_document(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        update: DocumentUpdate,
    ) -> Result<AssignedDocument> {
        self.require_admin(actor, "update documents")?;
        self.ledger.update(document_id, update, &actor.user).await
    }

    /// Returns a document by id.
    #[must_use]
    pub fn document(&self, document_id: DocumentId) -> Option<AssignedDocument> {
        self.ledger.get(document_id)
    }

    /// Documents matching `query`, ordered by id.
    #[must_use]
    pub fn query(&self, query: &LedgerQuery) -> Vec<AssignedDocument> {
        self.ledger.query(query)
    }

    /// Documents matching `query` as a JSON array.
    ///
    /// # Errors
    ///
    /// [`ReservationError::InvalidArgument`] if serialization fails.
    pub fn export_json(&self, query: &LedgerQuery) -> Result<String> {
        self.ledger.export_json(query)
    }

    /// Amendments of a document, oldest first.
    #[must_use]
    pub fn history(&self, document_id: DocumentId) -> Vec<Amendment> {
        self.ledger.history(document_id)
    }

    /// Formats a number as printed on documents, e.g. `УТЗ-000042`.
    #[must_use]
    pub fn format_number(&self, number: u64) -> String {
        format_doc_no(&self.config.doc_prefix, self.config.number_width, number)
    }

    /// Returns a copy of an open session.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::snapshot`].
    pub async fn session(&self, token: SessionToken) -> Result<SessionSnapshot> {
        self.sessions.snapshot(token).await
    }

    /// Returns a copy of an equipment's sequence.
    ///
    /// # Errors
    ///
    /// See [`SequenceAllocator::snapshot`].
    pub async fn sequence(&self, equipment_id: EquipmentId) -> Result<SequenceSnapshot> {
        self.allocator.snapshot(equipment_id).await
    }

    /// Registers an allocator event listener.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&AllocatorEvent) + Send + Sync + 'static,
    {
        self.allocator.add_listener(listener);
    }

    /// The sweeper reclaiming expired sessions.
    #[must_use]
    pub fn sweeper(&self) -> &Arc<ReclamationSweeper<J>> {
        &self.sweeper
    }

    /// Runs one sweep over every open session now.
    pub async fn sweep_now(&self) -> SweepReport {
        self.sweeper.sweep_once().await
    }

    /// Starts the periodic sweeper; it stops when `shutdown` turns `true`.
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.sweeper.spawn(shutdown)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Clock used for timestamps and expiry.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The assignment ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<AssignmentLedger<J>> {
        &self.ledger
    }

    /// The session registry.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager<J>> {
        &self.sessions
    }

    fn golden_filter(&self, filter: Option<GoldenFilter>) -> GoldenFilter {
        filter.unwrap_or_else(|| self.config.default_golden.into())
    }

    fn require_admin(&self, actor: &Actor, operation: &'static str) -> Result<()> {
        if actor.is_admin {
            return Ok(());
        }
        warn!(user = %actor.user, operation, "permission denied");
        Err(ReservationError::PermissionDenied {
            user: actor.user.clone(),
            operation,
        })
    }

    /// Runs `attempt`; on exhaustion sweeps the equipment and, if that freed
    /// anything, tries once more.
    ///
    /// Sequential and golden searches never move below `next_candidate`, so
    /// the retry only succeeds when the sweep freed numbers at or above it:
    /// abandoned specific or golden reservations. Numbers freed below it are
    /// reachable again through specific reservations only.
    async fn reclaiming<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match attempt().await {
            Err(ReservationError::Exhaustion {
                equipment_id,
                requested,
                found,
            }) => {
                let report = self.sweeper.sweep_equipment(equipment_id).await;
                if report.numbers_released == 0 {
                    return Err(ReservationError::Exhaustion {
                        equipment_id,
                        requested,
                        found,
                    });
                }
                debug!(
                    %equipment_id,
                    numbers_released = report.numbers_released,
                    "retrying allocation after reclamation"
                );
                attempt().await
            }
            other => other,
        }
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session registry and state transitions.
//!
//! Each session sits behind its own async mutex. Every mutation, including a
//! close by the sweeper, holds that mutex for its whole duration, so a late
//! assignment and a reclamation of the same session are strictly ordered:
//! whichever takes the lock second sees the other's result.

use super::state::{
    NumberRequest, NumberStatus, ReservationKind, ReservationSession, SessionSnapshot,
    SessionState,
};
use crate::allocator::SequenceAllocator;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{ReservationError, Result};
use crate::ledger::{AssignedDocument, CommitRequest, DocumentDraft, InMemoryJournal, Journal};
use crate::types::{Actor, EquipmentId, SessionToken};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

type SessionHandle = Arc<Mutex<ReservationSession>>;

struct SessionEntry {
    equipment_id: EquipmentId,
    session: SessionHandle,
}

/// Owns every open reservation session.
pub struct SessionManager<J: Journal = InMemoryJournal> {
    sessions: DashMap<SessionToken, SessionEntry>,
    allocator: Arc<SequenceAllocator<J>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<J: Journal> SessionManager<J> {
    /// Creates an empty registry reserving through `allocator`.
    #[must_use]
    pub fn new(
        allocator: Arc<SequenceAllocator<J>>,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            allocator,
            clock,
            config: config.clone(),
        }
    }

    /// Opens an `Active` session over numbers already reserved through the
    /// allocator and not yet held by any session.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] if `numbers` is empty
    /// - [`ReservationError::UnknownNumber`] if a number is not reserved or
    ///   another session already holds it
    pub async fn open(
        &self,
        equipment_id: EquipmentId,
        numbers: &[u64],
        kind: ReservationKind,
        user: &str,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        if numbers.is_empty() {
            return Err(ReservationError::invalid(
                "a session needs at least one number",
            ));
        }
        let token = SessionToken::new();
        self.allocator
            .claim(equipment_id, numbers.to_vec(), token)
            .await?;
        Ok(self.insert(token, equipment_id, numbers, kind, user, ttl))
    }

    fn insert(
        &self,
        token: SessionToken,
        equipment_id: EquipmentId,
        numbers: &[u64],
        kind: ReservationKind,
        user: &str,
        ttl: Option<Duration>,
    ) -> SessionSnapshot {
        let session = ReservationSession::new(
            token,
            equipment_id,
            numbers,
            kind,
            user.to_string(),
            self.config.effective_ttl(ttl),
            self.clock.now_ms(),
        );
        let snapshot = session.snapshot();
        self.sessions.insert(
            session.token,
            SessionEntry {
                equipment_id,
                session: Arc::new(Mutex::new(session)),
            },
        );

        info!(
            token = %snapshot.token,
            %equipment_id,
            kind = ?kind,
            count = numbers.len(),
            user,
            "session opened"
        );
        snapshot
    }

    /// Reserves numbers and opens a session holding them.
    ///
    /// # Errors
    ///
    /// Any allocation error of [`SequenceAllocator`].
    pub async fn reserve(
        &self,
        equipment_id: EquipmentId,
        request: NumberRequest,
        actor: &Actor,
        ttl: Option<Duration>,
    ) -> Result<SessionSnapshot> {
        let kind = request.kind();
        let token = SessionToken::new();
        let numbers = self.allocate(equipment_id, request, actor, token).await?;
        Ok(self.insert(token, equipment_id, &numbers, kind, &actor.user, ttl))
    }

    /// Binds one reserved number of the session to a document.
    ///
    /// Retrying with the same payload after a lost reply returns the document
    /// created by the first attempt.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownSession`] if the token is unknown, closed
    ///   or expired (an expired session is closed on the spot)
    /// - [`ReservationError::UnknownNumber`] if the number is not in the session
    /// - [`ReservationError::AlreadyAssigned`] if it is bound with a different payload
    /// - any error of [`AssignmentLedger::commit`](crate::ledger::AssignmentLedger::commit)
    pub async fn assign_one(
        &self,
        token: SessionToken,
        number: u64,
        draft: DocumentDraft,
        user: &str,
    ) -> Result<AssignedDocument> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        self.ensure_open(&mut session).await?;
        self.assign_locked(&mut session, number, draft, user).await
    }

    /// Binds the lowest unassigned number of the session.
    ///
    /// # Errors
    ///
    /// As [`assign_one`](Self::assign_one); [`ReservationError::SessionClosed`]
    /// if nothing is left to assign.
    pub async fn assign_next(
        &self,
        token: SessionToken,
        draft: DocumentDraft,
        user: &str,
    ) -> Result<AssignedDocument> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        self.ensure_open(&mut session).await?;
        let Some(number) = session.unassigned().first().copied() else {
            return Err(ReservationError::SessionClosed(token));
        };
        self.assign_locked(&mut session, number, draft, user).await
    }

    /// Reserves more numbers for an `Active` session.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownSession`] for an unknown token
    /// - [`ReservationError::SessionClosed`] unless the session is `Active`
    ///   and within its TTL
    /// - any allocation error of [`SequenceAllocator`]
    pub async fn add_numbers(
        &self,
        token: SessionToken,
        request: NumberRequest,
        actor: &Actor,
    ) -> Result<Vec<u64>> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        let now = self.clock.now_ms();

        if session.state == SessionState::Active && session.is_expired(now) {
            self.close_locked(&mut session, "expired").await?;
        }
        if session.state != SessionState::Active {
            return Err(ReservationError::SessionClosed(token));
        }

        let numbers = self
            .allocate(session.equipment_id, request, actor, token)
            .await?;
        session.add(&numbers);
        session.touch(self.clock.now_ms());
        debug!(%token, count = numbers.len(), "numbers added to session");
        Ok(numbers)
    }

    /// Resets the session's TTL clock.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownSession`] if the token is unknown, closed or
    /// already expired.
    pub async fn touch(&self, token: SessionToken) -> Result<SessionSnapshot> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        self.ensure_open(&mut session).await?;
        session.touch(self.clock.now_ms());
        Ok(session.snapshot())
    }

    /// Drops one unassigned number from the session and frees it.
    ///
    /// A session left with no numbers at all is closed.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownSession`] as for [`touch`](Self::touch)
    /// - [`ReservationError::UnknownNumber`] if the number is not in the session
    /// - [`ReservationError::AlreadyAssigned`] if it is already bound
    pub async fn release_number(&self, token: SessionToken, number: u64) -> Result<()> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        self.ensure_open(&mut session).await?;

        let equipment_id = session.equipment_id;
        match session.status_of(number) {
            None => Err(ReservationError::UnknownNumber {
                equipment_id,
                number,
            }),
            Some(NumberStatus::Assigned) => Err(ReservationError::AlreadyAssigned {
                equipment_id,
                number,
            }),
            Some(NumberStatus::Unassigned) => {
                self.allocator
                    .release_for(equipment_id, vec![number], token)
                    .await?;
                let now = self.clock.now_ms();
                session.remove(number, now);
                session.touch(now);
                debug!(%token, number, "number released from session");
                if session.is_empty() {
                    self.close_locked(&mut session, "emptied").await?;
                }
                Ok(())
            }
        }
    }

    /// Frees reserved numbers of an equipment wherever they are held.
    ///
    /// Numbers held by an open session are dropped from it first, and a
    /// session left with no numbers is closed. Numbers no session holds are
    /// freed directly. Assigned and unknown numbers are skipped. Returns the
    /// freed numbers, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the equipment worker is gone.
    pub async fn release_numbers(
        &self,
        equipment_id: EquipmentId,
        numbers: Vec<u64>,
    ) -> Result<Vec<u64>> {
        let mut pending: BTreeSet<u64> = numbers.into_iter().collect();
        let mut freed = Vec::new();

        for token in self.tokens_for(equipment_id) {
            if pending.is_empty() {
                break;
            }
            let Ok(handle) = self.handle(token) else {
                continue;
            };
            let mut session = handle.lock().await;
            if session.state == SessionState::Closed {
                continue;
            }
            let held: Vec<u64> = session
                .unassigned()
                .into_iter()
                .filter(|n| pending.contains(n))
                .collect();
            if held.is_empty() {
                continue;
            }

            let released = self
                .allocator
                .release_for(equipment_id, held.clone(), token)
                .await?;
            let now = self.clock.now_ms();
            for number in &held {
                pending.remove(number);
                session.remove(*number, now);
            }
            debug!(%token, count = released.len(), "numbers withdrawn from session");
            freed.extend(released);
            if session.is_empty() {
                self.close_locked(&mut session, "emptied").await?;
            }
        }

        let loose = self
            .allocator
            .release(equipment_id, pending.into_iter().collect())
            .await?;
        freed.extend(loose);
        freed.sort_unstable();
        Ok(freed)
    }

    /// Closes the session now and frees its unassigned numbers.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownSession`] if the token is unknown or closed.
    pub async fn cancel(&self, token: SessionToken) -> Result<Vec<u64>> {
        let handle = self.handle(token)?;
        let mut session = handle.lock().await;
        if session.state == SessionState::Closed {
            return Err(ReservationError::UnknownSession(token));
        }
        self.close_locked(&mut session, "cancelled").await
    }

    /// Closes the session if it is due at `now_ms`: past its TTL while
    /// `Active`, or past the grace window while `Draining`.
    ///
    /// Returns the freed numbers when the session was closed, `None` when it
    /// is still live or already gone.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Shutdown`] if the release could not reach
    /// the equipment worker; the session then stays open for the next sweep.
    pub async fn close_if_expired(
        &self,
        token: SessionToken,
        now_ms: u64,
    ) -> Result<Option<Vec<u64>>> {
        let Ok(handle) = self.handle(token) else {
            return Ok(None);
        };
        let mut session = handle.lock().await;
        if session.state == SessionState::Closed
            || !session.is_due(now_ms, self.config.drain_grace())
        {
            return Ok(None);
        }
        let reason = if session.state == SessionState::Draining {
            "drained"
        } else {
            "expired"
        };
        self.close_locked(&mut session, reason).await.map(Some)
    }

    /// Returns a copy of the session.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownSession`] if the token is unknown or closed.
    pub async fn snapshot(&self, token: SessionToken) -> Result<SessionSnapshot> {
        let handle = self.handle(token)?;
        let session = handle.lock().await;
        if session.state == SessionState::Closed {
            return Err(ReservationError::UnknownSession(token));
        }
        Ok(session.snapshot())
    }

    /// Tokens of every open session.
    #[must_use]
    pub fn tokens(&self) -> Vec<SessionToken> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Tokens of the open sessions of one equipment.
    #[must_use]
    pub fn tokens_for(&self, equipment_id: EquipmentId) -> Vec<SessionToken> {
        self.sessions
            .iter()
            .filter(|entry| entry.equipment_id == equipment_id)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The allocator sessions reserve through.
    #[must_use]
    pub fn allocator(&self) -> &Arc<SequenceAllocator<J>> {
        &self.allocator
    }

    fn handle(&self, token: SessionToken) -> Result<SessionHandle> {
        self.sessions
            .get(&token)
            .map(|entry| entry.session.clone())
            .ok_or(ReservationError::UnknownSession(token))
    }

    async fn allocate(
        &self,
        equipment_id: EquipmentId,
        request: NumberRequest,
        actor: &Actor,
        owner: SessionToken,
    ) -> Result<Vec<u64>> {
        match request {
            NumberRequest::Sequential(count) => {
                self.allocator
                    .allocate_sequential_for(equipment_id, count, actor, owner)
                    .await
            }
            NumberRequest::Specific(numbers) => {
                self.allocator
                    .allocate_specific_for(equipment_id, numbers, owner)
                    .await
            }
            NumberRequest::Golden { count, filter } => {
                self.allocator
                    .allocate_golden_for(equipment_id, count, filter, owner)
                    .await
            }
        }
    }

    /// Fails with `UnknownSession` unless the session is live, closing it if
    /// it has become due.
    async fn ensure_open(&self, session: &mut ReservationSession) -> Result<()> {
        if session.state == SessionState::Closed {
            return Err(ReservationError::UnknownSession(session.token));
        }
        if session.is_due(self.clock.now_ms(), self.config.drain_grace()) {
            let reason = if session.state == SessionState::Draining {
                "drained"
            } else {
                "expired"
            };
            self.close_locked(session, reason).await?;
            return Err(ReservationError::UnknownSession(session.token));
        }
        Ok(())
    }

    async fn assign_locked(
        &self,
        session: &mut ReservationSession,
        number: u64,
        draft: DocumentDraft,
        user: &str,
    ) -> Result<AssignedDocument> {
        let equipment_id = session.equipment_id;
        let Some(status) = session.status_of(number) else {
            return Err(ReservationError::UnknownNumber {
                equipment_id,
                number,
            });
        };

        let request = CommitRequest {
            session: session.token,
            number,
            equipment_id,
            draft,
            user: user.to_string(),
        };
        let result = self.allocator.commit(request).await;
        let now = self.clock.now_ms();

        match result {
            Ok(document) => {
                if status == NumberStatus::Unassigned {
                    session.mark_assigned(number, now);
                    debug!(
                        token = %session.token,
                        number,
                        document_id = %document.id,
                        remaining = session.unassigned().len(),
                        "number assigned in session"
                    );
                } else {
                    session.touch(now);
                }
                Ok(document)
            }
            Err(e @ ReservationError::Journal(_)) if status == NumberStatus::Unassigned => {
                // The worker already released the number.
                session.remove(number, now);
                if session.is_empty() {
                    self.close_locked(session, "emptied").await?;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn close_locked(
        &self,
        session: &mut ReservationSession,
        reason: &'static str,
    ) -> Result<Vec<u64>> {
        let released = self
            .allocator
            .release_for(session.equipment_id, session.unassigned(), session.token)
            .await?;
        session.state = SessionState::Closed;
        self.sessions.remove(&session.token);

        info!(
            token = %session.token,
            equipment_id = %session.equipment_id,
            reason,
            released = released.len(),
            "session closed"
        );
        Ok(released)
    }
}

/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session state and its serializable snapshot.

use crate::numbering::GoldenFilter;
use crate::types::{EquipmentId, SessionToken};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Lifecycle of a reservation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// At least one reserved number is still unassigned.
    Active,
    /// Every number is assigned; retries are accepted until the grace window ends.
    Draining,
    /// The token is no longer valid.
    Closed,
}

/// How a session's numbers were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    /// Auto-increment.
    Sequential,
    /// Explicit admin override.
    AdminSpecific,
    /// Golden-number search.
    Golden,
}

/// State of one reserved number inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberStatus {
    /// Reserved, not yet bound.
    Unassigned,
    /// Bound to a document in the ledger.
    Assigned,
}

/// Which numbers to reserve.
#[derive(Debug, Clone)]
pub enum NumberRequest {
    /// The next `count` free numbers.
    Sequential(usize),
    /// Exactly these numbers.
    Specific(Vec<u64>),
    /// `count` numbers selected by `filter`.
    Golden {
        /// How many numbers to reserve.
        count: usize,
        /// Selection rule.
        filter: GoldenFilter,
    },
}

impl NumberRequest {
    /// The session kind a reservation of this shape opens.
    #[must_use]
    pub fn kind(&self) -> ReservationKind {
        match self {
            Self::Sequential(_) => ReservationKind::Sequential,
            Self::Specific(_) => ReservationKind::AdminSpecific,
            Self::Golden { .. } => ReservationKind::Golden,
        }
    }

    /// Returns `true` for requests only admins may make.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        !matches!(self, Self::Sequential(_))
    }
}

/// One reserved number as stored in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNumber {
    /// The number.
    pub number: u64,
    /// Its state.
    pub status: NumberStatus,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session token.
    pub token: SessionToken,
    /// Equipment the numbers belong to.
    pub equipment_id: EquipmentId,
    /// User who opened the session.
    pub user: String,
    /// How the first numbers were chosen.
    pub kind: ReservationKind,
    /// Lifecycle state.
    pub state: SessionState,
    /// Creation time (ms).
    pub created_at_ms: u64,
    /// Last activity (ms).
    pub last_touch_ms: u64,
    /// Inactivity window (ms).
    pub ttl_ms: u64,
    /// When the last number was assigned (ms), once draining.
    pub drained_at_ms: Option<u64>,
    /// Reserved numbers, ascending.
    pub numbers: Vec<SessionNumber>,
}

impl SessionSnapshot {
    /// Numbers not yet assigned.
    #[must_use]
    pub fn unassigned(&self) -> Vec<u64> {
        self.numbers
            .iter()
            .filter(|n| n.status == NumberStatus::Unassigned)
            .map(|n| n.number)
            .collect()
    }

    /// Instant after which the session expires unless touched (ms).
    #[must_use]
    pub fn expires_at_ms(&self) -> u64 {
        self.last_touch_ms.saturating_add(self.ttl_ms)
    }
}

/// A bounded-lifetime group of reserved numbers for one equipment.
#[derive(Debug, Clone)]
pub struct ReservationSession {
    pub(crate) token: SessionToken,
    pub(crate) equipment_id: EquipmentId,
    pub(crate) user: String,
    pub(crate) kind: ReservationKind,
    pub(crate) state: SessionState,
    pub(crate) created_at_ms: u64,
    pub(crate) last_touch_ms: u64,
    pub(crate) ttl: Duration,
    pub(crate) drained_at_ms: Option<u64>,
    pub(crate) numbers: BTreeMap<u64, NumberStatus>,
}

impl ReservationSession {
    pub(crate) fn new(
        token: SessionToken,
        equipment_id: EquipmentId,
        numbers: &[u64],
        kind: ReservationKind,
        user: String,
        ttl: Duration,
        now_ms: u64,
    ) -> Self {
        Self {
            token,
            equipment_id,
            user,
            kind,
            state: SessionState::Active,
            created_at_ms: now_ms,
            last_touch_ms: now_ms,
            ttl,
            drained_at_ms: None,
            numbers: numbers
                .iter()
                .map(|n| (*n, NumberStatus::Unassigned))
                .collect(),
        }
    }

    /// Session token.
    #[must_use]
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Equipment the numbers belong to.
    #[must_use]
    pub fn equipment_id(&self) -> EquipmentId {
        self.equipment_id
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Status of a number, if it belongs to the session.
    #[must_use]
    pub fn status_of(&self, number: u64) -> Option<NumberStatus> {
        self.numbers.get(&number).copied()
    }

    /// Numbers not yet assigned, ascending.
    #[must_use]
    pub fn unassigned(&self) -> Vec<u64> {
        self.numbers
            .iter()
            .filter(|(_, status)| **status == NumberStatus::Unassigned)
            .map(|(number, _)| *number)
            .collect()
    }

    /// `last_touch + ttl < now`.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.last_touch_ms.saturating_add(duration_ms(self.ttl)) < now_ms
    }

    /// A drained session whose grace window has passed.
    #[must_use]
    pub fn is_drained(&self, now_ms: u64, grace: Duration) -> bool {
        self.state == SessionState::Draining
            && self
                .drained_at_ms
                .is_some_and(|at| at.saturating_add(duration_ms(grace)) < now_ms)
    }

    /// Whether the session should be closed at `now_ms`.
    ///
    /// An active session closes when its TTL lapses; a draining one when its
    /// grace window ends.
    #[must_use]
    pub fn is_due(&self, now_ms: u64, grace: Duration) -> bool {
        match self.state {
            SessionState::Active => self.is_expired(now_ms),
            SessionState::Draining => self.is_drained(now_ms, grace),
            SessionState::Closed => true,
        }
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.last_touch_ms = now_ms;
    }

    pub(crate) fn add(&mut self, numbers: &[u64]) {
        for number in numbers {
            self.numbers.insert(*number, NumberStatus::Unassigned);
        }
    }

    pub(crate) fn mark_assigned(&mut self, number: u64, now_ms: u64) {
        self.numbers.insert(number, NumberStatus::Assigned);
        self.touch(now_ms);
        self.refresh(now_ms);
    }

    pub(crate) fn remove(&mut self, number: u64, now_ms: u64) {
        self.numbers.remove(&number);
        self.refresh(now_ms);
    }

    /// Moves an active session with nothing left to assign to `Draining`.
    fn refresh(&mut self, now_ms: u64) {
        if self.state == SessionState::Active && self.unassigned().is_empty() {
            self.state = SessionState::Draining;
            self.drained_at_ms = Some(now_ms);
        }
    }

    /// Returns `true` if nothing is left in the session at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Returns a serializable copy.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token,
            equipment_id: self.equipment_id,
            user: self.user.clone(),
            kind: self.kind,
            state: self.state,
            created_at_ms: self.created_at_ms,
            last_touch_ms: self.last_touch_ms,
            ttl_ms: duration_ms(self.ttl),
            drained_at_ms: self.drained_at_ms,
            numbers: self
                .numbers
                .iter()
                .map(|(number, status)| SessionNumber {
                    number: *number,
                    status: *status,
                })
                .collect(),
        }
    }
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

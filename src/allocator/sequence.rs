/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Per-equipment number sequence.
//!
//! [`NumberSequence`] is plain data with no synchronization of its own: the
//! equipment worker is its only owner, so every method here runs inside that
//! worker's single-writer loop. Methods that only look for candidates take
//! `&self`, which lets the worker persist a new high-water mark before the
//! numbers are actually taken.

use crate::error::{ReservationError, Result};
use crate::numbering::{GoldenCriteria, GoldenFilter};
use crate::types::{EquipmentId, SessionToken};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Serializable view of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    /// Owning equipment.
    pub equipment_id: EquipmentId,
    /// Smallest number never issued by auto-increment.
    pub next_candidate: u64,
    /// Reserved or assigned numbers, ascending.
    pub used: Vec<u64>,
    /// Permanently assigned numbers, ascending.
    pub assigned: Vec<u64>,
}

/// Monotonic counter plus the set of numbers already handed out.
///
/// `assigned` is always a subset of `used`, and `next_candidate` never moves
/// backwards. A reserved number held by a session records that session as its
/// owner; only the owner may commit or release it.
#[derive(Debug, Clone)]
pub struct NumberSequence {
    equipment_id: EquipmentId,
    next_candidate: u64,
    max_number: u64,
    used: BTreeSet<u64>,
    assigned: BTreeSet<u64>,
    owners: BTreeMap<u64, SessionToken>,
}

impl NumberSequence {
    /// Creates an empty sequence whose auto-increment starts at `next_candidate`.
    #[must_use]
    pub fn new(equipment_id: EquipmentId, next_candidate: u64, max_number: u64) -> Self {
        Self {
            equipment_id,
            next_candidate: next_candidate.max(1),
            max_number,
            used: BTreeSet::new(),
            assigned: BTreeSet::new(),
            owners: BTreeMap::new(),
        }
    }

    /// Marks numbers already bound in the ledger.
    #[must_use]
    pub fn with_assigned(mut self, assigned: impl IntoIterator<Item = u64>) -> Self {
        for number in assigned {
            self.used.insert(number);
            self.assigned.insert(number);
        }
        self
    }

    /// Owning equipment.
    #[must_use]
    pub fn equipment_id(&self) -> EquipmentId {
        self.equipment_id
    }

    /// Smallest number never issued by auto-increment.
    #[must_use]
    pub fn next_candidate(&self) -> u64 {
        self.next_candidate
    }

    /// Returns `true` if the number is reserved or assigned.
    #[must_use]
    pub fn is_used(&self, number: u64) -> bool {
        self.used.contains(&number)
    }

    /// Returns `true` if the number is permanently assigned.
    #[must_use]
    pub fn is_assigned(&self, number: u64) -> bool {
        self.assigned.contains(&number)
    }

    /// Returns `true` if the number is reserved but not yet assigned.
    #[must_use]
    pub fn is_reserved(&self, number: u64) -> bool {
        self.is_used(number) && !self.is_assigned(number)
    }

    /// Session holding a reserved number, if any.
    #[must_use]
    pub fn owner_of(&self, number: u64) -> Option<SessionToken> {
        self.owners.get(&number).copied()
    }

    /// Free numbers left in `[next_candidate, max_number]`, ignoring any
    /// golden skip.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        if self.next_candidate > self.max_number {
            return 0;
        }
        let span = self.max_number - self.next_candidate + 1;
        let used = self.used.range(self.next_candidate..=self.max_number).count();
        span.saturating_sub(u64::try_from(used).unwrap_or(u64::MAX))
    }

    /// Finds the next `count` free numbers at or above `next_candidate`.
    ///
    /// Numbers matching `skip` are passed over. Nothing is marked.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] when `count` is zero
    /// - [`ReservationError::Exhaustion`] when the range ends first
    pub fn next_free(&self, count: usize, skip: Option<GoldenCriteria>) -> Result<Vec<u64>> {
        if count == 0 {
            return Err(ReservationError::invalid("count must be positive"));
        }
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        if count > remaining {
            return Err(ReservationError::Exhaustion {
                equipment_id: self.equipment_id,
                requested: count,
                found: remaining,
            });
        }
        let mut found = Vec::with_capacity(count.min(remaining));
        let mut candidate = self.next_candidate;
        while found.len() < count {
            if candidate > self.max_number {
                return Err(ReservationError::Exhaustion {
                    equipment_id: self.equipment_id,
                    requested: count,
                    found: found.len(),
                });
            }
            let skipped = skip.is_some_and(|criteria| criteria.matches(candidate));
            if !skipped && !self.used.contains(&candidate) {
                found.push(candidate);
            }
            candidate += 1;
        }
        Ok(found)
    }

    /// Takes numbers returned by [`next_free`](Self::next_free) and moves
    /// `next_candidate` past the highest of them.
    pub fn take_sequential(&mut self, numbers: &[u64], owner: Option<SessionToken>) {
        self.take(numbers, owner);
        if let Some(highest) = numbers.iter().max() {
            self.next_candidate = self.next_candidate.max(highest + 1);
        }
    }

    /// Takes explicitly requested numbers, all or nothing.
    ///
    /// The numbers may lie below `next_candidate`, which does not move.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] for an empty list, a duplicate,
    ///   or a number outside `[1, max_number]`
    /// - [`ReservationError::NumberConflict`] listing every number already used
    pub fn take_specific(
        &mut self,
        numbers: &[u64],
        owner: Option<SessionToken>,
    ) -> Result<Vec<u64>> {
        if numbers.is_empty() {
            return Err(ReservationError::invalid("no numbers requested"));
        }
        let mut seen = BTreeSet::new();
        for &number in numbers {
            if number == 0 || number > self.max_number {
                return Err(ReservationError::invalid(format!(
                    "number {number} is outside 1..={}",
                    self.max_number
                )));
            }
            if !seen.insert(number) {
                return Err(ReservationError::invalid(format!(
                    "number {number} requested twice"
                )));
            }
        }

        let conflicts: Vec<u64> = numbers
            .iter()
            .copied()
            .filter(|n| self.used.contains(n))
            .collect();
        if !conflicts.is_empty() {
            return Err(ReservationError::NumberConflict {
                equipment_id: self.equipment_id,
                numbers: conflicts,
            });
        }

        self.take(numbers, owner);
        Ok(numbers.to_vec())
    }

    /// Finds `count` free numbers matching `filter`, scanning at most `window`
    /// candidates from `next_candidate`. Nothing is marked.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::InvalidArgument`] when `count` is zero
    /// - [`ReservationError::Exhaustion`] when the window ends first
    pub fn find_golden(&self, count: usize, filter: &GoldenFilter, window: u64) -> Result<Vec<u64>> {
        if count == 0 {
            return Err(ReservationError::invalid("count must be positive"));
        }
        let found: Vec<u64> = self.golden_candidates(filter, window).take(count).collect();
        if found.len() < count {
            return Err(ReservationError::Exhaustion {
                equipment_id: self.equipment_id,
                requested: count,
                found: found.len(),
            });
        }
        Ok(found)
    }

    /// Free numbers matching `filter` within `window` candidates of
    /// `next_candidate`, ascending.
    pub fn golden_candidates<'a>(
        &'a self,
        filter: &'a GoldenFilter,
        window: u64,
    ) -> impl Iterator<Item = u64> + 'a {
        let last = self
            .next_candidate
            .saturating_add(window.saturating_sub(1))
            .min(self.max_number);
        (self.next_candidate..=last).filter(move |n| !self.used.contains(n) && filter.matches(*n))
    }

    /// Marks numbers found by [`find_golden`](Self::find_golden), held by
    /// `owner` when given.
    pub fn take(&mut self, numbers: &[u64], owner: Option<SessionToken>) {
        self.used.extend(numbers.iter().copied());
        if let Some(owner) = owner {
            self.owners.extend(numbers.iter().map(|n| (*n, owner)));
        }
    }

    /// Hands reserved numbers nobody holds yet over to `owner`, all or
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownNumber`] for the first number that is not
    /// reserved, already assigned, or held by another session.
    pub fn claim(&mut self, numbers: &[u64], owner: SessionToken) -> Result<()> {
        if let Some(&number) = numbers.iter().find(|n| {
            !self.is_reserved(**n) || self.owner_of(**n).is_some_and(|held| held != owner)
        }) {
            return Err(ReservationError::UnknownNumber {
                equipment_id: self.equipment_id,
                number,
            });
        }
        self.owners.extend(numbers.iter().map(|n| (*n, owner)));
        Ok(())
    }

    /// Frees reserved numbers held by `owner` (`None` for numbers no session
    /// holds) and returns the ones actually freed.
    ///
    /// Assigned, unknown and foreign numbers are skipped.
    pub fn release(&mut self, numbers: &[u64], owner: Option<SessionToken>) -> Vec<u64> {
        numbers
            .iter()
            .copied()
            .filter(|n| {
                let freeable = self.is_reserved(*n) && self.owner_of(*n) == owner;
                if freeable {
                    self.used.remove(n);
                    self.owners.remove(n);
                }
                freeable
            })
            .collect()
    }

    /// Records that a reserved number is now bound in the ledger.
    pub fn mark_assigned(&mut self, number: u64) {
        self.used.insert(number);
        self.assigned.insert(number);
        self.owners.remove(&number);
    }

    /// Returns a serializable copy.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            equipment_id: self.equipment_id,
            next_candidate: self.next_candidate,
            used: self.used.iter().copied().collect(),
            assigned: self.assigned.iter().copied().collect(),
        }
    }
}

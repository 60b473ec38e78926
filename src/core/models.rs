//! Data models
//!
//! Types shared by the genus registry and the process table.

use crate::config::NO_GENUS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process identifier. Monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u64);

impl Pid {
    pub fn from_raw(raw: u64) -> Self {
        Pid(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Genus identifier, handed out by the registry's monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenusId(u64);

impl GenusId {
    pub fn from_raw(raw: u64) -> Self {
        GenusId(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GenusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `(genus, capacity)` pair cached by a process that belongs to a genus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub genus: GenusId,
    pub capacity: u32,
}

/// Per-process genus view.
///
/// Each process holds one, copied by value into forked children. An empty
/// view reports the sentinel `-1`. Only the process's own acquire, or the
/// owner's release and exec, rewrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenusView {
    membership: Option<Membership>,
}

impl GenusView {
    /// Empty view, the state of every new process.
    pub const fn empty() -> Self {
        Self { membership: None }
    }

    pub(crate) fn stamped(genus: GenusId, capacity: u32) -> Self {
        Self {
            membership: Some(Membership { genus, capacity }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_none()
    }

    pub fn membership(&self) -> Option<Membership> {
        self.membership
    }

    pub fn genus(&self) -> Option<GenusId> {
        self.membership.map(|m| m.genus)
    }

    pub fn capacity(&self) -> Option<u32> {
        self.membership.map(|m| m.capacity)
    }

    /// Genus id as reported to user code, `-1` when empty.
    pub fn raw_genus_id(&self) -> i64 {
        self.membership
            .and_then(|m| i64::try_from(m.genus.as_raw()).ok())
            .unwrap_or(NO_GENUS)
    }

    /// Capacity as reported to user code, `-1` when empty.
    pub fn raw_capacity(&self) -> i64 {
        self.membership
            .map(|m| i64::from(m.capacity))
            .unwrap_or(NO_GENUS)
    }

    pub(crate) fn clear(&mut self) {
        self.membership = None;
    }
}

/// One successful reservation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenusEntry {
    pub id: GenusId,
    pub capacity: u32,
    pub owner: Pid,
    pub acquired_at: DateTime<Utc>,
}

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    /// Terminated, waiting for the parent to reap it. Owned reservations stay live.
    Zombie,
}

/// Consistent copy of the ledger taken under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub total_budget: u32,
    pub total_reserved: u32,
    pub next_id: u64,
    pub entries: Vec<GenusEntry>,
}

impl RegistrySnapshot {
    pub fn available(&self) -> u32 {
        self.total_budget - self.total_reserved
    }

    /// Whether the reserved total matches the live entries and fits the budget.
    pub fn is_consistent(&self) -> bool {
        let sum: u64 = self.entries.iter().map(|e| u64::from(e.capacity)).sum();
        sum == u64::from(self.total_reserved) && self.total_reserved <= self.total_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_view_reports_sentinels() {
        let view = GenusView::empty();
        assert!(view.is_empty());
        assert_eq!(view.raw_genus_id(), -1);
        assert_eq!(view.raw_capacity(), -1);
        assert_eq!(view, GenusView::default());
    }

    #[test]
    fn test_view_copy_is_independent() {
        let mut parent = GenusView::stamped(GenusId::from_raw(4), 40);
        let child = parent;

        parent.clear();

        assert!(parent.is_empty());
        assert_eq!(child.raw_genus_id(), 4);
        assert_eq!(child.raw_capacity(), 40);
    }

    #[test]
    fn test_snapshot_consistency() {
        let entry = GenusEntry {
            id: GenusId::from_raw(1),
            capacity: 30,
            owner: Pid::from_raw(2),
            acquired_at: Utc::now(),
        };
        let snapshot = RegistrySnapshot {
            total_budget: 90,
            total_reserved: 30,
            next_id: 2,
            entries: vec![entry],
        };
        assert!(snapshot.is_consistent());
        assert_eq!(snapshot.available(), 60);

        let broken = RegistrySnapshot {
            total_reserved: 31,
            ..snapshot
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&Pid::from_raw(12)).unwrap();
        assert_eq!(json, "12");
        let id: GenusId = serde_json::from_str("5").unwrap();
        assert_eq!(id.as_raw(), 5);
    }
}

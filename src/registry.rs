//! Capacity registry
//!
//! Owns the fixed capacity budget and the ledger of live genus entries. Every
//! mutation (acquire and release) runs inside one `parking_lot::Mutex`
//! critical section covering the whole check-then-act sequence, so the
//! reserved total can never overshoot the budget, not even transiently.
//!
//! The registry is an ordinary value: build it once, wrap it in an `Arc` and
//! hand clones of the `Arc` to whoever drives process lifecycles.
//!
//! ## Ownership
//!
//! A process's [`GenusView`] is copied by value into its children, so many
//! views may name the same genus. The ledger records the single owner of each
//! entry and release is a plain identity comparison against it; inherited
//! copies never return capacity.

use crate::config::RegistryConfig;
use crate::core::models::{GenusEntry, GenusId, GenusView, Pid, RegistrySnapshot};
use crate::error::{ConfigError, GenusError, GenusResult};
use crate::logging::warn;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Ledger {
    total_reserved: u32,
    next_id: u64,
    entries: HashMap<GenusId, GenusEntry>,
    owners: HashMap<Pid, GenusId>,
}

/// Outcome of an owner-checked release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The entry was removed and its capacity returned to the pool
    Released(GenusEntry),
    /// The view was empty
    NotHeld,
    /// The entry named by the view no longer exists
    AlreadyReleased,
    /// The caller only inherited the genus
    NotOwner { owner: Pid },
}

impl ReleaseOutcome {
    pub fn released_capacity(&self) -> u32 {
        match self {
            ReleaseOutcome::Released(entry) => entry.capacity,
            _ => 0,
        }
    }
}

/// The capacity registry. Built explicitly and shared through an `Arc`.
#[derive(Debug)]
pub struct CapacityRegistry {
    total_budget: u32,
    ledger: Mutex<Ledger>,
}

impl Default for CapacityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityRegistry {
    /// Registry with the default budget of 90.
    pub fn new() -> Self {
        Self::from_valid(RegistryConfig::default())
    }

    /// Registry built from `config`, which must pass [`RegistryConfig::validate`].
    pub fn with_config(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: RegistryConfig) -> Self {
        Self {
            total_budget: config.total_budget,
            ledger: Mutex::new(Ledger {
                total_reserved: 0,
                next_id: config.id_origin,
                entries: HashMap::new(),
                owners: HashMap::new(),
            }),
        }
    }

    /// Validated registry behind an `Arc`, ready to share across threads.
    pub fn shared(config: RegistryConfig) -> Result<Arc<Self>, ConfigError> {
        Self::with_config(config).map(Arc::new)
    }

    pub fn total_budget(&self) -> u32 {
        self.total_budget
    }

    /// Reserve `requested` units for `pid` and stamp its view.
    ///
    /// Validation of the amount and of the caller's own view needs no lock;
    /// the budget check, id assignment and insertion happen as one unit.
    pub fn acquire(&self, pid: Pid, view: &mut GenusView, requested: i64) -> GenusResult<GenusId> {
        let capacity = self.validate_amount(requested).inspect_err(|_| {
            tracing::debug!(pid = %pid, requested, "genus request rejected: invalid amount");
        })?;

        if let Some(genus) = view.genus() {
            tracing::debug!(pid = %pid, genus = %genus, "genus request rejected: already a member");
            return Err(GenusError::AlreadyOwnsGenus { pid, genus });
        }

        let id = {
            let mut ledger = self.ledger.lock();
            let remaining = self.total_budget - ledger.total_reserved;
            if capacity > remaining {
                let reserved = ledger.total_reserved;
                drop(ledger);
                tracing::debug!(pid = %pid, capacity, reserved, "genus request rejected: pool exhausted");
                return Err(GenusError::PoolExhausted {
                    requested: capacity,
                    reserved,
                    total: self.total_budget,
                });
            }

            // ids must stay distinguishable from the -1 failure value
            if i64::try_from(ledger.next_id).is_err() {
                let next = ledger.next_id;
                drop(ledger);
                tracing::warn!(pid = %pid, next, "genus request rejected: id space exhausted");
                return Err(GenusError::IdSpaceExhausted { next });
            }

            debug_assert!(
                !ledger.owners.contains_key(&pid),
                "process {pid} owns a live entry but presented an empty view"
            );

            let id = GenusId::from_raw(ledger.next_id);
            ledger.next_id += 1;
            ledger.total_reserved += capacity;
            ledger.entries.insert(
                id,
                GenusEntry {
                    id,
                    capacity,
                    owner: pid,
                    acquired_at: Utc::now(),
                },
            );
            ledger.owners.insert(pid, id);
            *view = GenusView::stamped(id, capacity);
            id
        };

        tracing::debug!(pid = %pid, genus = %id, capacity, "genus acquired");
        Ok(id)
    }

    /// Capacity as a budget unit count, or `InvalidAmount` outside `1..=total_budget`.
    pub fn validate_amount(&self, requested: i64) -> GenusResult<u32> {
        match u32::try_from(requested) {
            Ok(c) if c >= 1 && c <= self.total_budget => Ok(c),
            _ => Err(GenusError::InvalidAmount {
                requested,
                max: self.total_budget,
            }),
        }
    }

    /// Release the entry owned by `pid` and reset its view.
    ///
    /// Empty views and already released entries are no-ops. Calling this on
    /// behalf of a process that merely inherited the genus is a caller bug.
    pub fn release(&self, pid: Pid, view: &mut GenusView) -> ReleaseOutcome {
        let outcome = self.take_if_owner(pid, view);
        match &outcome {
            ReleaseOutcome::Released(_) => view.clear(),
            ReleaseOutcome::NotOwner { owner } => {
                debug_assert_eq!(
                    *owner, pid,
                    "release requested by {pid}, which is not the owner"
                );
                warn(format!(
                    "ignoring release by {pid}: genus {} is owned by {owner}",
                    view.raw_genus_id()
                ));
            }
            ReleaseOutcome::NotHeld | ReleaseOutcome::AlreadyReleased => {}
        }
        outcome
    }

    /// Remove the entry named by `view` if, and only if, `pid` is its owner.
    ///
    /// Leaves `view` untouched; the lifecycle hooks decide what happens to it.
    pub(crate) fn take_if_owner(&self, pid: Pid, view: &GenusView) -> ReleaseOutcome {
        let Some(genus) = view.genus() else {
            return ReleaseOutcome::NotHeld;
        };

        let outcome = {
            let mut ledger = self.ledger.lock();
            match ledger.entries.get(&genus).map(|entry| entry.owner) {
                None => ReleaseOutcome::AlreadyReleased,
                Some(owner) if owner != pid => ReleaseOutcome::NotOwner { owner },
                Some(_) => match ledger.entries.remove(&genus) {
                    Some(entry) => {
                        ledger.total_reserved -= entry.capacity;
                        ledger.owners.remove(&pid);
                        ReleaseOutcome::Released(entry)
                    }
                    None => ReleaseOutcome::AlreadyReleased,
                },
            }
        };

        if let ReleaseOutcome::Released(entry) = &outcome {
            tracing::debug!(pid = %pid, genus = %entry.id, capacity = entry.capacity, "genus released");
        }
        outcome
    }

    /// `(genus_id, capacity)` of a view, `-1` for both when empty. Lock free.
    pub fn query(view: &GenusView) -> (i64, i64) {
        (view.raw_genus_id(), view.raw_capacity())
    }

    pub fn total_reserved(&self) -> u32 {
        self.ledger.lock().total_reserved
    }

    pub fn available(&self) -> u32 {
        self.total_budget - self.total_reserved()
    }

    pub fn live_entries(&self) -> usize {
        self.ledger.lock().entries.len()
    }

    pub fn entry(&self, genus: GenusId) -> Option<GenusEntry> {
        self.ledger.lock().entries.get(&genus).cloned()
    }

    pub fn owner_of(&self, genus: GenusId) -> Option<Pid> {
        self.ledger.lock().entries.get(&genus).map(|entry| entry.owner)
    }

    /// Genus whose live entry is owned by `pid`, if any.
    pub fn owned_by(&self, pid: Pid) -> Option<GenusId> {
        self.ledger.lock().owners.get(&pid).copied()
    }

    pub fn is_owner(&self, pid: Pid, genus: GenusId) -> bool {
        self.owner_of(genus) == Some(pid)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let ledger = self.ledger.lock();
        let mut entries: Vec<GenusEntry> = ledger.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.id);
        RegistrySnapshot {
            total_budget: self.total_budget,
            total_reserved: ledger.total_reserved,
            next_id: ledger.next_id,
            entries,
        }
    }
}

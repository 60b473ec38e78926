//! Lifecycle hooks the process manager calls at fixed integration points.
//!
//! - duplication (fork): copy the parent's view into the child
//! - self image replacement (exec): owner releases, everyone gets a fresh view
//! - final reap (wait): owner releases, inherited holders do nothing
//!
//! Exit has no hook: a zombie keeps its reservation until it is reaped.

use crate::core::models::{GenusView, Pid};
use crate::logging::info;
use crate::registry::{CapacityRegistry, ReleaseOutcome};

pub trait LifecycleHooks: Send + Sync {
    /// Child view for a freshly duplicated process. Never touches the ledger.
    fn on_duplicate(&self, parent: &GenusView) -> GenusView;

    /// Runs before a process installs a new image. `view` is reset in all cases.
    fn on_self_replace(&self, pid: Pid, view: &mut GenusView) -> ReleaseOutcome;

    /// Runs once the parent has collected a terminated process.
    fn on_reap(&self, pid: Pid, view: GenusView) -> ReleaseOutcome;
}

impl LifecycleHooks for CapacityRegistry {
    fn on_duplicate(&self, parent: &GenusView) -> GenusView {
        *parent
    }

    fn on_self_replace(&self, pid: Pid, view: &mut GenusView) -> ReleaseOutcome {
        let outcome = self.take_if_owner(pid, view);
        if let ReleaseOutcome::Released(entry) = &outcome {
            info(format!(
                "process {pid} replaced its image, genus {} returned {} units",
                entry.id, entry.capacity
            ));
        }
        view.clear();
        outcome
    }

    fn on_reap(&self, pid: Pid, view: GenusView) -> ReleaseOutcome {
        let outcome = self.take_if_owner(pid, &view);
        if let ReleaseOutcome::Released(entry) = &outcome {
            info(format!(
                "process {pid} reaped, genus {} returned {} units",
                entry.id, entry.capacity
            ));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::GenusId;

    fn pid(raw: u64) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn test_duplicate_copies_empty_view() {
        let registry = CapacityRegistry::new();
        let child = registry.on_duplicate(&GenusView::empty());
        assert!(child.is_empty());
        assert_eq!(registry.total_reserved(), 0);
    }

    #[test]
    fn test_duplicate_is_a_snapshot() {
        let registry = CapacityRegistry::new();
        let mut parent = GenusView::empty();
        let genus = registry.acquire(pid(2), &mut parent, 40).unwrap();

        let child = registry.on_duplicate(&parent);
        registry.on_reap(pid(2), parent);

        // Owner is gone, the child's copy stays readable but disconnected.
        assert_eq!(child.genus(), Some(genus));
        assert_eq!(child.raw_capacity(), 40);
        assert!(registry.entry(genus).is_none());
    }

    #[test]
    fn test_owner_self_replace_releases() {
        let registry = CapacityRegistry::new();
        let mut view = GenusView::empty();
        registry.acquire(pid(2), &mut view, 15).unwrap();

        let outcome = registry.on_self_replace(pid(2), &mut view);

        assert_eq!(outcome.released_capacity(), 15);
        assert!(view.is_empty());
        assert_eq!(registry.total_reserved(), 0);
    }

    #[test]
    fn test_inherited_self_replace_resets_view_only() {
        let registry = CapacityRegistry::new();
        let mut parent = GenusView::empty();
        registry.acquire(pid(2), &mut parent, 20).unwrap();
        let mut child = registry.on_duplicate(&parent);

        let outcome = registry.on_self_replace(pid(3), &mut child);

        assert_eq!(outcome, ReleaseOutcome::NotOwner { owner: pid(2) });
        assert!(child.is_empty());
        assert_eq!(parent.genus(), Some(GenusId::from_raw(1)));
        assert_eq!(registry.total_reserved(), 20);
    }

    #[test]
    fn test_reap_of_inherited_holder_is_noop() {
        let registry = CapacityRegistry::new();
        let mut parent = GenusView::empty();
        registry.acquire(pid(2), &mut parent, 40).unwrap();
        let child = registry.on_duplicate(&parent);

        assert!(matches!(
            registry.on_reap(pid(3), child),
            ReleaseOutcome::NotOwner { .. }
        ));
        assert_eq!(registry.total_reserved(), 40);

        assert_eq!(registry.on_reap(pid(2), parent).released_capacity(), 40);
        assert_eq!(registry.total_reserved(), 0);
    }

    #[test]
    fn test_reap_after_self_replace_does_not_double_release() {
        let registry = CapacityRegistry::new();
        let mut view = GenusView::empty();
        registry.acquire(pid(2), &mut view, 10).unwrap();
        let before_exec = view;

        registry.on_self_replace(pid(2), &mut view);
        assert_eq!(
            registry.on_reap(pid(2), before_exec),
            ReleaseOutcome::AlreadyReleased
        );
        assert_eq!(registry.on_reap(pid(2), view), ReleaseOutcome::NotHeld);
        assert_eq!(registry.total_reserved(), 0);
    }
}

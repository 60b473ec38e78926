//! In-memory process table, the process manager side of the genus hooks.
//!
//! Reproduces the fork / exec / exit / wait lifecycle the registry is
//! designed around. Pids are monotonic and never reused; an `init` process
//! exists from construction and adopts orphans. Exit only turns a process
//! into a zombie; the genus hooks fire on exec and on reap.
//!
//! ## Lock ordering
//!
//! Process table shard lock → registry lock. `exec` and `acquire_genus` hold
//! the caller's entry while the registry runs; `try_wait` removes the zombie
//! first and calls the reap hook with no table lock held. The registry never
//! calls back into the table.

use crate::config::{INIT_IMAGE, INIT_PID, NO_GENUS};
use crate::core::models::{GenusId, GenusView, Pid, ProcessState};
use crate::error::{GenusError, ProcessError};
use crate::hooks::LifecycleHooks;
use crate::logging::debug;
use crate::registry::{CapacityRegistry, ReleaseOutcome};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the host process manager is able to report to the hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Reaping is a separate, later event than exit, so zombies exist.
    pub deferred_reap: bool,
}

/// One row of the process table.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub image: String,
    pub state: ProcessState,
    pub killed: bool,
    view: GenusView,
    acquired: bool,
}

impl ProcessEntry {
    pub fn view(&self) -> GenusView {
        self.view
    }

    /// Set by the first successful acquisition and never cleared, exec included.
    pub fn has_acquired(&self) -> bool {
        self.acquired
    }
}

/// Result of collecting one zombie child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub killed: bool,
    pub released: u32,
}

#[derive(Debug)]
pub struct ProcessTable {
    registry: Arc<CapacityRegistry>,
    processes: DashMap<Pid, ProcessEntry>,
    next_pid: AtomicU64,
}

impl ProcessTable {
    /// Build a table that already holds the `init` process.
    pub fn new(registry: Arc<CapacityRegistry>) -> Self {
        let init = Pid::from_raw(INIT_PID);
        let processes = DashMap::new();
        processes.insert(
            init,
            ProcessEntry {
                pid: init,
                parent: None,
                image: INIT_IMAGE.to_string(),
                state: ProcessState::Running,
                killed: false,
                view: GenusView::empty(),
                acquired: false,
            },
        );

        Self {
            registry,
            processes,
            next_pid: AtomicU64::new(INIT_PID + 1),
        }
    }

    pub fn init_pid(&self) -> Pid {
        Pid::from_raw(INIT_PID)
    }

    pub fn registry(&self) -> &Arc<CapacityRegistry> {
        &self.registry
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            deferred_reap: true,
        }
    }

    /// Duplicate `parent`. The child starts with a copy of the parent's view.
    pub fn fork(&self, parent: Pid) -> Result<Pid, ProcessError> {
        let (parent_view, image) = {
            let entry = self
                .processes
                .get(&parent)
                .ok_or(ProcessError::NoSuchProcess(parent))?;
            if entry.state != ProcessState::Running {
                return Err(ProcessError::NotRunning(parent));
            }
            (entry.view, entry.image.clone())
        };

        let pid = Pid::from_raw(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let view = self.registry.on_duplicate(&parent_view);
        self.processes.insert(
            pid,
            ProcessEntry {
                pid,
                parent: Some(parent),
                image,
                state: ProcessState::Running,
                killed: false,
                view,
                acquired: false,
            },
        );

        // Parent killed while we were inserting: hand the child to init.
        let parent_alive = self
            .processes
            .get(&parent)
            .map(|entry| entry.state == ProcessState::Running)
            .unwrap_or(false);
        if !parent_alive {
            if let Some(mut child) = self.processes.get_mut(&pid) {
                child.parent = Some(self.init_pid());
            }
        }

        debug(format!(
            "fork {parent} -> {pid} (genus {})",
            view.raw_genus_id()
        ));
        Ok(pid)
    }

    /// Replace the image of `pid`. Owners give their capacity back first.
    pub fn exec(&self, pid: Pid, image: &str) -> Result<ReleaseOutcome, ProcessError> {
        let mut entry = self
            .processes
            .get_mut(&pid)
            .ok_or(ProcessError::NoSuchProcess(pid))?;
        if entry.state != ProcessState::Running {
            return Err(ProcessError::NotRunning(pid));
        }

        let outcome = self.registry.on_self_replace(pid, &mut entry.view);
        entry.image = image.to_string();
        Ok(outcome)
    }

    pub fn exit(&self, pid: Pid) -> Result<(), ProcessError> {
        self.terminate(pid, false)
    }

    /// Forced termination. Bookkeeping is the same as `exit`.
    pub fn kill(&self, pid: Pid) -> Result<(), ProcessError> {
        self.terminate(pid, true)
    }

    fn terminate(&self, pid: Pid, killed: bool) -> Result<(), ProcessError> {
        if pid == self.init_pid() {
            return Err(ProcessError::InitCannotExit);
        }

        {
            let mut entry = self
                .processes
                .get_mut(&pid)
                .ok_or(ProcessError::NoSuchProcess(pid))?;
            if entry.state != ProcessState::Running {
                return Err(ProcessError::NotRunning(pid));
            }
            entry.state = ProcessState::Zombie;
            entry.killed = killed;
        }

        let orphans = self.children(pid);
        let init = self.init_pid();
        for orphan in &orphans {
            if let Some(mut child) = self.processes.get_mut(orphan) {
                child.parent = Some(init);
            }
        }

        tracing::info!(pid = %pid, killed, orphans = orphans.len(), "process terminated");
        Ok(())
    }

    /// Collect one zombie child of `parent`, firing the reap hook.
    ///
    /// `Ok(None)` means children exist but none has terminated yet.
    pub fn try_wait(&self, parent: Pid) -> Result<Option<Reaped>, ProcessError> {
        match self.state(parent) {
            None => return Err(ProcessError::NoSuchProcess(parent)),
            Some(ProcessState::Zombie) => return Err(ProcessError::NotRunning(parent)),
            Some(ProcessState::Running) => {}
        }

        let mut children: Vec<(Pid, ProcessState)> = self
            .processes
            .iter()
            .filter(|entry| entry.parent == Some(parent))
            .map(|entry| (entry.pid, entry.state))
            .collect();
        if children.is_empty() {
            return Err(ProcessError::NoChildren(parent));
        }
        children.sort_by_key(|(pid, _)| *pid);

        for (pid, _) in children
            .into_iter()
            .filter(|(_, state)| *state == ProcessState::Zombie)
        {
            let removed = self.processes.remove_if(&pid, |_, entry| {
                entry.state == ProcessState::Zombie && entry.parent == Some(parent)
            });
            if let Some((_, entry)) = removed {
                let outcome = self.registry.on_reap(pid, entry.view);
                tracing::info!(parent = %parent, pid = %pid, released = outcome.released_capacity(), "process reaped");
                return Ok(Some(Reaped {
                    pid,
                    killed: entry.killed,
                    released: outcome.released_capacity(),
                }));
            }
        }

        Ok(None)
    }

    /// Collect every zombie child of `parent` currently waiting.
    pub fn reap_zombies(&self, parent: Pid) -> Result<Vec<Reaped>, ProcessError> {
        let mut reaped = Vec::new();
        loop {
            match self.try_wait(parent) {
                Ok(Some(child)) => reaped.push(child),
                Ok(None) | Err(ProcessError::NoChildren(_)) => return Ok(reaped),
                Err(err) => return Err(err),
            }
        }
    }

    /// Typed acquisition on behalf of `pid`.
    ///
    /// A process gets one successful acquisition per lifetime. Releasing the
    /// genus through exec does not open a second one.
    pub fn acquire_genus(&self, pid: Pid, capacity: i64) -> Result<GenusId, ProcessError> {
        let mut entry = self
            .processes
            .get_mut(&pid)
            .ok_or(ProcessError::NoSuchProcess(pid))?;
        if entry.state != ProcessState::Running {
            return Err(ProcessError::NotRunning(pid));
        }

        self.registry.validate_amount(capacity)?;
        if entry.acquired {
            if let Some(genus) = entry.view.genus() {
                return Err(GenusError::AlreadyOwnsGenus { pid, genus }.into());
            }
            return Err(GenusError::AlreadyAcquired { pid }.into());
        }

        let id = self.registry.acquire(pid, &mut entry.view, capacity)?;
        entry.acquired = true;
        Ok(id)
    }

    /// User-level call: genus id on success, `-1` on any failure.
    pub fn setgenus(&self, pid: Pid, capacity: i64) -> i64 {
        match self.acquire_genus(pid, capacity) {
            Ok(id) => i64::try_from(id.as_raw()).unwrap_or(GenusError::SYSCALL_FAILURE),
            Err(err) => {
                debug(format!("setgenus({capacity}) by {pid} failed: {err}"));
                GenusError::SYSCALL_FAILURE
            }
        }
    }

    pub fn getgenus(&self, pid: Pid) -> i64 {
        self.view(pid)
            .map(|view| view.raw_genus_id())
            .unwrap_or(NO_GENUS)
    }

    pub fn getcapacity(&self, pid: Pid) -> i64 {
        self.view(pid)
            .map(|view| view.raw_capacity())
            .unwrap_or(NO_GENUS)
    }

    pub fn view(&self, pid: Pid) -> Result<GenusView, ProcessError> {
        self.processes
            .get(&pid)
            .map(|entry| entry.view)
            .ok_or(ProcessError::NoSuchProcess(pid))
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.processes.get(&pid).map(|entry| entry.state)
    }

    pub fn parent_of(&self, pid: Pid) -> Option<Pid> {
        self.processes.get(&pid).and_then(|entry| entry.parent)
    }

    pub fn image(&self, pid: Pid) -> Option<String> {
        self.processes.get(&pid).map(|entry| entry.image.clone())
    }

    pub fn entry(&self, pid: Pid) -> Option<ProcessEntry> {
        self.processes.get(&pid).map(|entry| entry.clone())
    }

    pub fn children(&self, pid: Pid) -> Vec<Pid> {
        let mut children: Vec<Pid> = self
            .processes
            .iter()
            .filter(|entry| entry.parent == Some(pid))
            .map(|entry| entry.pid)
            .collect();
        children.sort();
        children
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

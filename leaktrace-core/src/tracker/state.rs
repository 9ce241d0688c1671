//! Live-object, access and GC phase bookkeeping.

use crate::types::ObjectAddr;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// GC phase as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcPhase {
    /// Number of completed GC cycles.
    pub completed: u64,
    /// Whether a cycle is in progress.
    pub in_progress: bool,
    /// Whether the cycle in progress may move objects.
    pub compacting: bool,
}

impl GcPhase {
    fn start(&mut self, compacting: bool) {
        self.in_progress = true;
        self.compacting = compacting;
    }

    fn finish(&mut self) {
        self.completed += 1;
        self.in_progress = false;
        self.compacting = false;
    }
}

/// Mutable state of the object event tracker.
#[derive(Debug)]
pub(crate) struct ObjectState {
    /// Addresses currently holding a tracked object.
    live: HashSet<ObjectAddr>,
    /// 32-bit ids of objects already reported accessed this epoch.
    accessed: HashSet<u32>,
    /// Bound on `accessed`.
    access_set_limit: usize,
    gc: GcPhase,
}

impl ObjectState {
    pub(crate) fn new(access_set_limit: usize) -> Self {
        Self {
            live: HashSet::new(),
            accessed: HashSet::new(),
            access_set_limit,
            gc: GcPhase::default(),
        }
    }

    /// Register a new object. Returns `false` if the address was already live.
    pub(crate) fn allocate(&mut self, addr: ObjectAddr) -> bool {
        // A fresh object at a reused address has not been accessed yet.
        self.accessed.remove(&addr.id32());
        self.live.insert(addr)
    }

    /// Forget a dead object. Returns `false` if the address was not live.
    pub(crate) fn kill(&mut self, addr: ObjectAddr) -> bool {
        self.accessed.remove(&addr.id32());
        self.live.remove(&addr)
    }

    /// Re-key an object from `from` to `to`.
    ///
    /// Afterwards `to` is live and `from` is not, whatever was known before.
    /// Returns `false` if `from` was not live.
    pub(crate) fn relocate(&mut self, from: ObjectAddr, to: ObjectAddr) -> bool {
        let was_live = self.live.remove(&from);
        self.live.insert(to);

        let was_accessed = self.accessed.remove(&from.id32());
        if was_accessed {
            self.accessed.insert(to.id32());
        } else {
            self.accessed.remove(&to.id32());
        }

        was_live
    }

    /// Note an access. Returns `true` if this is the first access of `addr`
    /// in the current epoch.
    pub(crate) fn first_access(&mut self, addr: ObjectAddr) -> bool {
        let id = addr.id32();
        if self.accessed.contains(&id) {
            return false;
        }
        if self.accessed.len() >= self.access_set_limit {
            self.accessed.clear();
        }
        self.accessed.insert(id)
    }

    pub(crate) fn gc_started(&mut self, compacting: bool) {
        self.gc.start(compacting);
        self.accessed.clear();
    }

    pub(crate) fn gc_finished(&mut self) {
        self.gc.finish();
        self.accessed.clear();
    }

    pub(crate) fn is_live(&self, addr: ObjectAddr) -> bool {
        self.live.contains(&addr)
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    fn access_count(&self) -> usize {
        self.accessed.len()
    }

    pub(crate) fn gc(&self) -> GcPhase {
        self.gc
    }
}

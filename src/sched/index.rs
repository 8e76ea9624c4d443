//! Per-container ordered sched index: an ordered set of schedulable
//! entities (processes or subcontainers) keyed by `(vruntime,
//! node-identity)`. Grounded in `original_source/src/kernel/sched.c`'s
//! `schqueue` (there a red-black tree keyed by `_schedtree_node_cmp`); kept
//! here as a sorted `Vec` over stable handles. `NPROC`-scale containers
//! make a sorted vec's O(n) insert perfectly fine in practice while making
//! the ordering contract trivial to verify, at the cost of giving up the
//! tree's O(log n) bound the spec names as a target -- noted as an Open
//! Question resolution in the grounding ledger rather than silently
//! claimed as O(log n).

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::param::TRAPTIME_NONE;

/// Either a process or a container, as seen by its parent's sched index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedNodeId(pub u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Hand out a fresh, globally unique node identity. Called once per process
/// or container at creation time and stashed in its `SchedInfo`; used only
/// to break vruntime ties, matching `_schedtree_node_cmp`'s comparison on
/// raw node addresses.
pub fn alloc_node_id() -> SchedNodeId {
    SchedNodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Per-entity schedule bookkeeping, embedded in both `Proc` and
/// `Container`.
pub struct SchedInfo {
    pub vruntime: u64,
    pub lastrun: i64,
    pub traptime: i64,
    pub is_container: bool,
    /// Stable identity used to break vruntime ties and to find this
    /// entity's own node when it must be erased from its parent's index.
    pub node_id: SchedNodeId,
}

impl SchedInfo {
    pub const fn new(is_container: bool) -> Self {
        SchedInfo {
            vruntime: 0,
            lastrun: -1,
            traptime: TRAPTIME_NONE,
            is_container,
            node_id: SchedNodeId(0),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Entry {
    vruntime: u64,
    node_id: SchedNodeId,
    is_container: bool,
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Matches `_schedtree_node_cmp`: order by `vruntime` first, break ties
    /// by node identity so two equal-vruntime entities still have a total
    /// order (required for a well-formed ordered set).
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.vruntime
            .cmp(&other.vruntime)
            .then(self.node_id.0.cmp(&other.node_id.0))
    }
}

/// An ordered set of schedulable entities belonging to one container.
pub struct SchedIndex {
    entries: Vec<Entry>,
}

impl SchedIndex {
    pub const fn new() -> Self {
        SchedIndex {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, vruntime: u64, node_id: SchedNodeId, is_container: bool) {
        let entry = Entry {
            vruntime,
            node_id,
            is_container,
        };
        let pos = self.entries.partition_point(|e| *e < entry);
        self.entries.insert(pos, entry);
    }

    pub fn erase(&mut self, node_id: SchedNodeId) {
        if let Some(pos) = self.entries.iter().position(|e| e.node_id == node_id) {
            self.entries.remove(pos);
        }
    }

    /// Smallest entity in this index, without removing it.
    pub fn first(&self) -> Option<(SchedNodeId, bool)> {
        self.entries.first().map(|e| (e.node_id, e.is_container))
    }

    /// All entities in increasing-vruntime order, without removing any.
    pub fn iter(&self) -> impl Iterator<Item = (SchedNodeId, bool)> + '_ {
        self.entries.iter().map(|e| (e.node_id, e.is_container))
    }

    pub fn min_vruntime(&self) -> u64 {
        self.entries.first().map(|e| e.vruntime).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_vruntime_then_identity() {
        let mut idx = SchedIndex::new();
        idx.insert(10, SchedNodeId(2), false);
        idx.insert(10, SchedNodeId(1), false);
        idx.insert(5, SchedNodeId(3), false);

        let (first, _) = idx.first().unwrap();
        assert_eq!(first, SchedNodeId(3));

        idx.erase(SchedNodeId(3));
        let (next, _) = idx.first().unwrap();
        // both remaining entries have vruntime 10; identity breaks the tie.
        assert_eq!(next, SchedNodeId(1));
    }

    #[test]
    fn erase_then_reinsert_resnaps_position() {
        let mut idx = SchedIndex::new();
        idx.insert(0, SchedNodeId(1), false);
        idx.insert(100, SchedNodeId(2), false);
        idx.erase(SchedNodeId(1));
        idx.insert(50, SchedNodeId(1), false);
        let (first, _) = idx.first().unwrap();
        assert_eq!(first, SchedNodeId(1));
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn min_vruntime_empty_is_zero() {
        let idx = SchedIndex::new();
        assert_eq!(idx.min_vruntime(), 0);
    }
}

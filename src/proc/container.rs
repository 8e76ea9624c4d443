//! Container (cgroup-like) grouping. A container is itself a schedulable
//! entity in its parent's sched index, grounded in
//! `original_source/src/kernel/container.c`.

use alloc::vec::Vec;

use crate::proc::pid::PidAllocator;
use crate::proc::process::ProcId;
use crate::sched::index::{SchedIndex, SchedInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub usize);

pub struct Container {
    pub parent: Option<ContainerId>,
    pub rootproc: Option<ProcId>,
    /// This container's own entry in its parent's [`SchedIndex`] (unused
    /// for the root container, which has no parent).
    pub schinfo: SchedInfo,
    /// The ordered set of this container's own schedulable children
    /// (processes and subcontainers) -- component D of the scheduler core.
    pub index: SchedIndex,
    pub pids: PidAllocator,
}

impl Container {
    fn new(parent: Option<ContainerId>) -> Self {
        let mut schinfo = SchedInfo::new(true);
        schinfo.node_id = crate::sched::index::alloc_node_id();
        Container {
            parent,
            rootproc: None,
            schinfo,
            index: SchedIndex::new(),
            pids: PidAllocator::new(),
        }
    }
}

pub struct ContainerArena {
    slots: Vec<Container>,
}

impl ContainerArena {
    fn new() -> Self {
        ContainerArena { slots: Vec::new() }
    }

    pub fn get(&self, id: ContainerId) -> &Container {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: ContainerId) -> &mut Container {
        &mut self.slots[id.0]
    }

    pub fn create(&mut self, parent: Option<ContainerId>) -> ContainerId {
        self.slots.push(Container::new(parent));
        ContainerId(self.slots.len() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContainerId, &Container)> {
        self.slots.iter().enumerate().map(|(i, c)| (ContainerId(i), c))
    }
}

static mut ARENA: Option<ContainerArena> = None;
static mut ROOT: Option<ContainerId> = None;

/// Bring up the root container. Must run before any process is created,
/// matching `original_source`'s `define_early_init(root_container)`.
pub fn init() -> ContainerId {
    unsafe {
        let mut arena = ContainerArena::new();
        let root = arena.create(None);
        ARENA = Some(arena);
        ROOT = Some(root);
        root
    }
}

pub fn arena() -> &'static mut ContainerArena {
    unsafe { ARENA.as_mut().expect("container arena not initialized") }
}

pub fn root() -> ContainerId {
    unsafe { ROOT.expect("root container not initialized") }
}

//! Process record and the ARMv8-A-flavored saved-context shapes.
//!
//! Field list and the `UserContext`/`KernelContext` shapes are grounded in
//! `original_source/src/kernel/proc.h`; the enum values (including
//! `DEEPSLEEPING`, absent from the teacher's RISC-V `Procstate`) are
//! authoritative from the same header.

use alloc::vec::Vec;

use crate::mm::pgdir::PageDirectory;
use crate::param::NPROC;
use crate::proc::container::ContainerId;
use crate::proc::pid::PidAllocator;
use crate::sched::index::SchedInfo;
use crate::sync::Semaphore;

/// Stable handle into the global process arena. Indices are never reused
/// while a slot is live; `wait` frees a slot back to UNUSED before a new
/// `create_proc` may reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Runnable,
    Running,
    Sleeping,
    DeepSleeping,
    Zombie,
}

/// Saved AArch64 user-mode register file, restored by the trap-return path.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct UserContext {
    pub sp_el0: u64,
    pub ttbr0: u64,
    pub spsr: u64,
    pub elr: u64,
    pub x: [u64; 18],
}

/// Saved callee-saved register file used by `swtch`-equivalent context
/// switches between kernel threads.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct KernelContext {
    pub lr: u64,
    pub x0: u64,
    pub x1: u64,
    pub callee_saved: [u64; 11],
}

pub struct Proc {
    pub state: ProcState,
    pub killed: bool,
    pub idle: bool,
    pub is_container_root: bool,

    pub pid: u32,
    pub localpid: u32,
    pub exitcode: i32,

    pub parent: Option<ProcId>,
    pub children: Vec<ProcId>,
    pub container: Option<ContainerId>,

    pub childexit: Semaphore,
    pub schinfo: SchedInfo,
    pub pgdir: PageDirectory,

    /// Wait channel this process is blocked on, or `None` if not asleep.
    /// Identity is whatever address the blocker passes to `sleep_on`/`wake`
    /// (a semaphore's own address, a sleeplock's own address, ...).
    pub chan: Option<usize>,

    pub kstack: usize,
    pub ucontext: UserContext,
    pub kcontext: KernelContext,
}

impl Proc {
    const fn unused() -> Self {
        Proc {
            state: ProcState::Unused,
            killed: false,
            idle: false,
            is_container_root: false,
            pid: 0,
            localpid: 0,
            exitcode: 0,
            parent: None,
            children: Vec::new(),
            container: None,
            childexit: Semaphore::new(0),
            schinfo: SchedInfo::new(false),
            pgdir: PageDirectory::empty(),
            chan: None,
            kstack: 0,
            ucontext: UserContext {
                sp_el0: 0,
                ttbr0: 0,
                spsr: 0,
                elr: 0,
                x: [0; 18],
            },
            kcontext: KernelContext {
                lr: 0,
                x0: 0,
                x1: 0,
                callee_saved: [0; 11],
            },
        }
    }

    pub fn killed(&self) -> bool {
        self.killed
    }
}

pub struct ProcArena {
    slots: Vec<Proc>,
}

impl ProcArena {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(NPROC);
        for _ in 0..NPROC {
            slots.push(Proc::unused());
        }
        ProcArena { slots }
    }

    pub fn get(&self, id: ProcId) -> &Proc {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: ProcId) -> &mut Proc {
        &mut self.slots[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcId, &Proc)> {
        self.slots.iter().enumerate().map(|(i, p)| (ProcId(i), p))
    }

    /// Find the first `UNUSED` slot, without marking it taken (the caller
    /// does so under the process-tree lock).
    pub fn find_unused(&self) -> Option<ProcId> {
        self.slots
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .map(ProcId)
    }
}

static mut ARENA: Option<ProcArena> = None;
static mut GLOBAL_PIDS: Option<PidAllocator> = None;

/// Must be called exactly once, before any process is created.
pub fn init() {
    unsafe {
        ARENA = Some(ProcArena::new());
        GLOBAL_PIDS = Some(PidAllocator::new());
    }
}

pub fn arena() -> &'static mut ProcArena {
    unsafe { ARENA.as_mut().expect("proc arena not initialized") }
}

pub fn global_pids() -> &'static mut PidAllocator {
    unsafe { GLOBAL_PIDS.as_mut().expect("pid allocator not initialized") }
}

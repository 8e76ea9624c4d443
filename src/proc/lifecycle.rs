//! Process/container lifecycle: creation, starting, reparenting, exit,
//! wait, and kill. Grounded in `original_source/src/kernel/proc.c`.
//!
//! Lock ordering (never reversed): the process-tree lock is always
//! acquired before the scheduler lock.

use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::mm::page_pool;
use crate::proc::container;
use crate::proc::process::{self, KernelContext, ProcId, ProcState};
use crate::sched::core;
use crate::sync::Spinlock;

static mut PROC_TREE_LOCK: Spinlock = Spinlock::init_lock("proc_tree");

fn tree_lock() -> &'static mut Spinlock {
    unsafe { &mut PROC_TREE_LOCK }
}

/// Allocate a process record: a kernel stack, a fresh page directory, and
/// a global pid, matching `original_source`'s `init_proc` (called from
/// `create_proc`). The container-local pid is deferred to [`start_proc`],
/// matching the original's separation between the two. Returns `None` if
/// the arena is full or the page pool is exhausted.
pub fn create_proc() -> Option<ProcId> {
    let id = process::arena().find_unused()?;
    let kstack = page_pool::alloc_page()?;

    let p = process::arena().get_mut(id);
    p.state = ProcState::Unused;
    p.killed = false;
    p.idle = false;
    p.is_container_root = false;
    p.exitcode = 0;
    p.parent = None;
    p.children.clear();
    p.container = Some(container::root());
    p.kstack = kstack;
    p.ucontext = Default::default();
    p.kcontext = KernelContext::default();
    p.pgdir = crate::mm::pgdir::PageDirectory::empty();
    p.chan = None;
    p.schinfo = crate::sched::index::SchedInfo::new(false);
    p.schinfo.node_id = crate::sched::index::alloc_node_id();
    p.pid = process::global_pids().get();
    Some(id)
}

/// Attach `child` under the currently running process. Precondition:
/// `child.parent` is `None`.
pub fn set_parent_to_this(child: ProcId) {
    tree_lock().acquire();
    let this = core::this_id().expect("set_parent_to_this: no current process");
    debug_assert!(process::arena().get(child).parent.is_none());
    process::arena().get_mut(child).parent = Some(this);
    process::arena().get_mut(this).children.push(child);
    tree_lock().release();
}

/// Plant `entry`/`arg` as the first thing this process runs, reparent it
/// to the container root if it has no parent yet, assign its container
/// local pid, and make it runnable.
pub fn start_proc(p: ProcId, entry: u64, arg: u64) -> u32 {
    if process::arena().get(p).parent.is_none() {
        let root = container::arena().get(container::root()).rootproc;
        if let Some(root) = root {
            if root != p {
                set_parent_to_this_explicit(root, p);
            }
        }
    }

    let proc_entry_trampoline = crate::sched::core::proc_entry_trampoline as usize as u64;
    {
        let proc = process::arena().get_mut(p);
        proc.kcontext.lr = proc_entry_trampoline;
        proc.kcontext.x0 = entry;
        proc.kcontext.x1 = arg;
    }

    let container_id = process::arena().get(p).container.unwrap_or_else(container::root);
    let localpid = container::arena().get_mut(container_id).pids.get();
    process::arena().get_mut(p).localpid = localpid;

    core::activate_proc(p, false);
    localpid
}

fn set_parent_to_this_explicit(parent: ProcId, child: ProcId) {
    tree_lock().acquire();
    process::arena().get_mut(child).parent = Some(parent);
    process::arena().get_mut(parent).children.push(child);
    tree_lock().release();
}

/// Terminate the calling process. Never returns. Must not be called on an
/// idle process or a container root.
pub fn exit(code: i32) -> ! {
    let this = core::this_id().expect("exit: no current process");
    {
        let p = process::arena().get(this);
        assert!(!p.idle, "exit: idle process");
        assert!(!p.is_container_root, "exit: container root");
    }

    process::arena().get_mut(this).exitcode = code;

    let pgdir = core::this_pagedir_take();
    if let Some(mut pgdir) = pgdir {
        pgdir.free();
    }

    tree_lock().acquire();

    let container_id = process::arena().get(this).container;
    let new_root = container_id
        .and_then(|c| container::arena().get(c).rootproc)
        .unwrap_or(this);

    let children: Vec<ProcId> = process::arena().get(this).children.clone();
    for child in children {
        process::arena().get_mut(child).parent = Some(new_root);
        process::arena().get_mut(new_root).children.push(child);
        if process::arena().get(child).state == ProcState::Zombie {
            process::arena().get_mut(new_root).childexit.post();
        }
    }
    process::arena().get_mut(this).children.clear();

    if let Some(parent) = process::arena().get(this).parent {
        process::arena().get_mut(parent).childexit.post();
        info!("proc {} exiting, code {}", process::arena().get(this).pid, code);
    } else {
        warn!("proc {} exiting with no parent", process::arena().get(this).pid);
    }

    tree_lock().release();

    core::simple_sched(ProcState::Zombie);
    unreachable!("exit: scheduled after becoming ZOMBIE");
}

/// Block until at least one child has exited, reap the first ZOMBIE found,
/// and return its (pid, exit code). Returns `None` if the caller has no
/// children at all.
pub fn wait() -> Option<(u32, i32)> {
    let this = core::this_id().expect("wait: no current process");
    if process::arena().get(this).children.is_empty() {
        return None;
    }

    if !process::arena().get_mut(this).childexit.wait() {
        return None;
    }

    tree_lock().acquire();
    let children = process::arena().get(this).children.clone();
    let found = children
        .iter()
        .copied()
        .find(|&c| process::arena().get(c).state == ProcState::Zombie);

    let result = found.map(|child| {
        let pid = process::arena().get(child).pid;
        let localpid = process::arena().get(child).localpid;
        let exitcode = process::arena().get(child).exitcode;
        let container_id = process::arena()
            .get(child)
            .container
            .unwrap_or_else(container::root);

        process::global_pids().release(pid);
        container::arena().get_mut(container_id).pids.release(localpid);
        page_pool::free_page(process::arena().get(child).kstack);

        process::arena()
            .get_mut(this)
            .children
            .retain(|&c| c != child);
        process::arena().get_mut(child).state = ProcState::Unused;

        (pid, exitcode)
    });
    tree_lock().release();
    result
}

/// Found a fresh container rooted at a new process running `entry(arg)`,
/// nested under the calling process's own container. Returns the new
/// container and the local pid `entry` was started with. Grounded in
/// `original_source/src/kernel/container.c`'s `create_container`.
pub fn create_container(entry: u64, arg: u64) -> (container::ContainerId, u32) {
    let this = core::this_id().expect("create_container: no current process");
    let parent = process::arena()
        .get(this)
        .container
        .unwrap_or_else(container::root);

    let new_container = container::arena().create(Some(parent));
    let new_root = create_proc().expect("create_container: proc arena full");

    set_parent_to_this(new_root);
    process::arena().get_mut(new_root).container = Some(new_container);
    container::arena().get_mut(new_container).rootproc = Some(new_root);

    let localpid = start_proc(new_root, entry, arg);
    core::activate_container(new_container);
    (new_container, localpid)
}

/// DFS the process tree for a non-UNUSED process with the given global
/// pid; mark it killed and wake it if alertably asleep. Returns `false` if
/// no such process exists.
pub fn kill(pid: u32) -> bool {
    tree_lock().acquire();
    let found = process::arena()
        .iter()
        .find(|(_, p)| p.pid == pid && p.state != ProcState::Unused)
        .map(|(id, _)| id);

    let ok = if let Some(id) = found {
        process::arena().get_mut(id).killed = true;
        core::alert_proc(id);
        true
    } else {
        false
    };
    tree_lock().release();
    debug!("kill({}) -> {}", pid, ok);
    ok
}

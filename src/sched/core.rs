//! Scheduler core (component E): the global sched lock, the hierarchical
//! CFS pick-next descent, process activation, and the sleep/wakeup channel
//! mechanism every blocking primitive in [`crate::sync`] is built on.
//! Grounded in `original_source/src/kernel/sched.c`'s `_activate_proc`,
//! `update_this_state`, `_get_first_runnable`, `pick_next`,
//! `update_this_proc`, `simple_sched` and `proc_entry`.

use alloc::vec::Vec;

use log::trace;

use crate::arch::clock::get_timestamp_ms;
use crate::param::{NCPU, SCHED_QUANTUM_MS, TRAPTIME_NONE};
use crate::proc::container::{self, ContainerId};
use crate::proc::process::{self, KernelContext, Proc, ProcId, ProcState};
use crate::sched::cpu::{cpu_at, mycpu};
use crate::sched::index::SchedNodeId;
use crate::sync::Spinlock;

static mut SCHED_LOCK: Spinlock = Spinlock::init_lock("sched");

fn lock() -> &'static mut Spinlock {
    unsafe { &mut SCHED_LOCK }
}

extern "C" {
    /// Saves the callee-saved registers of the calling context into `*old`,
    /// loads `new`'s, and resumes wherever that context last called
    /// `swtch` against it. Implemented in assembly at the architecture
    /// boundary (not modeled here, the way the teacher's own `swtch` lives
    /// outside `proc.rs`).
    fn swtch(new: *const KernelContext, old: *mut KernelContext);
}

/// Seed one idle process per core. Must run once at boot before any core
/// enters its scheduling loop; safe to call from a single core since the
/// other cores are not yet running kernel code at that point.
pub fn init() {
    for i in 0..NCPU {
        let id = process::arena()
            .find_unused()
            .expect("sched::init: proc arena full seeding idle processes");
        {
            let p = process::arena().get_mut(id);
            p.idle = true;
            p.state = ProcState::Running;
            p.container = Some(container::root());
        }
        cpu_at(i).set_idle(id);
        cpu_at(i).set_thisproc(Some(id));
    }
}

/// The process currently running on this core, if any (includes the idle
/// process -- callers that care must check [`Proc::idle`](crate::proc::process::Proc) themselves).
pub fn this_id() -> Option<ProcId> {
    mycpu().thisproc()
}

pub fn this_proc() -> Option<&'static mut Proc> {
    this_id().map(|id| process::arena().get_mut(id))
}

pub fn this_pid() -> u32 {
    this_proc().map(|p| p.pid).unwrap_or(0)
}

/// Take ownership of the calling process's page directory, leaving an
/// empty one in its place. Used once, by `exit`, to tear the address space
/// down without racing a concurrent `get_pte`.
pub fn this_pagedir_take() -> Option<crate::mm::pgdir::PageDirectory> {
    let id = this_id()?;
    let p = process::arena().get_mut(id);
    Some(core::mem::replace(&mut p.pgdir, crate::mm::pgdir::PageDirectory::empty()))
}

/// Insert `id` into its container's sched index as `RUNNABLE`, seeded at
/// the minimum vruntime currently present there (a newly woken process
/// does not get to jump the queue, but it also does not inherit whatever
/// stale vruntime it had from its last run). Caller holds [`lock()`].
fn activate_into_index(id: ProcId) {
    process::arena().get_mut(id).state = ProcState::Runnable;
    let cid = process::arena()
        .get(id)
        .container
        .unwrap_or_else(container::root);
    let min_vruntime = container::arena().get(cid).index.min_vruntime();
    let node_id = process::arena().get(id).schinfo.node_id;
    process::arena().get_mut(id).schinfo.vruntime = min_vruntime;
    container::arena().get_mut(cid).index.insert(min_vruntime, node_id, false);
}

/// Make `id` runnable if it is currently sleeping or freshly created.
/// `onalert` distinguishes a best-effort wake (a kill signal) from a
/// genuine resource-ready wake: `DEEPSLEEPING` only answers the latter.
/// Returns whether the process actually changed state.
pub fn activate_proc(id: ProcId, onalert: bool) -> bool {
    lock().acquire();
    let state = process::arena().get(id).state;
    let activated = match state {
        ProcState::Runnable | ProcState::Running | ProcState::Zombie => false,
        ProcState::DeepSleeping if onalert => false,
        ProcState::Sleeping | ProcState::DeepSleeping | ProcState::Unused => {
            activate_into_index(id);
            true
        }
    };
    lock().release();
    activated
}

/// Deliver a kill signal's wake: the same activation path as a resource
/// wake, except a `DEEPSLEEPING` process does not respond to it.
pub fn alert_proc(id: ProcId) {
    activate_proc(id, true);
}

/// Insert a freshly created container into its parent's sched index, the
/// container analogue of [`activate_into_index`]. Called once, right
/// after its root process has been started. A no-op for a container with
/// no parent (the root container itself, which is never activated).
pub fn activate_container(cid: ContainerId) {
    lock().acquire();
    if let Some(parent) = container::arena().get(cid).parent {
        let min_vruntime = container::arena().get(parent).index.min_vruntime();
        let node_id = container::arena().get(cid).schinfo.node_id;
        container::arena().get_mut(cid).schinfo.vruntime = min_vruntime;
        container::arena()
            .get_mut(parent)
            .index
            .insert(min_vruntime, node_id, true);
    }
    lock().release();
}

/// Wake every process asleep on `chan`, alertable or not -- a real
/// resource became available, which is not the same thing as a kill
/// signal, so `DEEPSLEEPING` waiters are woken too.
pub fn wake(chan: usize) {
    lock().acquire();
    let waiters: Vec<ProcId> = process::arena()
        .iter()
        .filter(|(_, p)| {
            p.chan == Some(chan)
                && matches!(p.state, ProcState::Sleeping | ProcState::DeepSleeping)
        })
        .map(|(id, _)| id)
        .collect();
    for id in waiters {
        activate_into_index(id);
    }
    lock().release();
}

/// Block the calling process on wait channel `chan`, releasing `lk` for
/// the duration (and reacquiring it before returning, matching xv6's
/// sleep/wakeup contract so callers can loop on a predicate under their
/// own lock). `alertable` selects `SLEEPING` (interruptible by a kill)
/// versus `DEEPSLEEPING` (not). Returns `false` only when an alertable
/// sleep is abandoned because the process was killed.
pub fn sleep_on(chan: usize, lk: &mut Spinlock, alertable: bool) -> bool {
    let this = this_id().expect("sleep_on: no current process");
    lock().acquire();
    lk.release();

    process::arena().get_mut(this).chan = Some(chan);
    let target = if alertable {
        ProcState::Sleeping
    } else {
        ProcState::DeepSleeping
    };
    simple_sched_locked(target);

    process::arena().get_mut(this).chan = None;
    lk.acquire();

    if alertable {
        !process::arena().get(this).killed
    } else {
        true
    }
}

/// Public scheduling point for callers that do not already hold
/// [`lock()`] (everything except [`sleep_on`], which has its own reason to
/// hold it across releasing its caller's lock).
pub fn simple_sched(new_state: ProcState) {
    lock().acquire();
    simple_sched_locked(new_state);
}

/// Try to transition the calling process to `new_state` and hand the CPU
/// to whichever runnable entity has the smallest vruntime. Assumes
/// [`lock()`] is held; always releases it before returning. A pending kill
/// aimed at anything but `ZOMBIE` aborts the transition, matching
/// `simple_sched`'s own short-circuit in the original (the caller observes
/// it via its own `killed` check, e.g. [`sleep_on`]'s return value).
fn simple_sched_locked(new_state: ProcState) {
    let this = this_id().expect("simple_sched: no current process");
    assert_eq!(
        process::arena().get(this).state,
        ProcState::Running,
        "simple_sched: calling process is not RUNNING"
    );

    if process::arena().get(this).killed && new_state != ProcState::Zombie {
        lock().release();
        return;
    }

    update_this_state(this, new_state);
    let next = pick_next();
    update_this_proc(next);

    if next != this {
        trace!("cpu {}: pid {} -> pid {}", crate::sched::cpu::cpuid(), this_pid_of(this), this_pid_of(next));
        process::arena().get(next).pgdir.attach();
        let next_ctx = &process::arena().get(next).kcontext as *const KernelContext;
        let this_ctx = &mut process::arena().get_mut(this).kcontext as *mut KernelContext;
        unsafe { swtch(next_ctx, this_ctx) };
    }

    lock().release();
}

fn this_pid_of(id: ProcId) -> u32 {
    process::arena().get(id).pid
}

/// Update `this`'s (and its ancestor containers') vruntime to reflect time
/// spent running since its last dispatch, then -- if it is becoming
/// `RUNNABLE` again rather than blocking or exiting -- reinsert it into
/// its container's index. The idle process never participates in vruntime
/// accounting or the index.
fn update_this_state(this: ProcId, new_state: ProcState) {
    let now = get_timestamp_ms();
    process::arena().get_mut(this).state = new_state;
    if process::arena().get(this).idle {
        return;
    }

    let (traptime, lastrun) = {
        let p = process::arena().get(this);
        (p.schinfo.traptime, p.schinfo.lastrun)
    };
    let time = if traptime > 0 { traptime as u64 } else { now };
    let run = if lastrun > 0 {
        time.saturating_sub(lastrun as u64)
    } else {
        0
    };

    {
        let p = process::arena().get_mut(this);
        p.schinfo.traptime = TRAPTIME_NONE;
        p.schinfo.lastrun = -1;
        p.schinfo.vruntime += run;
    }

    let mut container_id = process::arena().get(this).container;
    while run > 0 {
        let Some(cid) = container_id else { break };
        if cid == container::root() {
            break;
        }
        let (node_id, parent, vruntime) = {
            let c = container::arena().get_mut(cid);
            c.schinfo.vruntime += run;
            (c.schinfo.node_id, c.parent, c.schinfo.vruntime)
        };
        if let Some(pid) = parent {
            let idx = &mut container::arena().get_mut(pid).index;
            idx.erase(node_id);
            idx.insert(vruntime, node_id, true);
        }
        container_id = parent;
    }

    if new_state == ProcState::Runnable {
        let cid = process::arena()
            .get(this)
            .container
            .unwrap_or_else(container::root);
        let node_id = process::arena().get(this).schinfo.node_id;
        let vruntime = process::arena().get(this).schinfo.vruntime;
        container::arena().get_mut(cid).index.insert(vruntime, node_id, false);
    }
}

fn proc_by_node(node_id: SchedNodeId) -> Option<ProcId> {
    process::arena()
        .iter()
        .find(|(_, p)| p.schinfo.node_id == node_id)
        .map(|(id, _)| id)
}

fn container_child_by_node(node_id: SchedNodeId) -> Option<ContainerId> {
    container::arena()
        .iter()
        .find(|(_, c)| c.schinfo.node_id == node_id)
        .map(|(id, _)| id)
}

/// Descend the container tree in vruntime order, entering a container
/// sub-index whenever the smallest entry at a level names one, and
/// falling through to the next sibling if that sub-index turns out to
/// have nothing runnable -- matching `_get_first_runnable`'s fallthrough.
/// Returns the idle process of this core if nothing runnable exists
/// anywhere reachable from the root container.
fn pick_next() -> ProcId {
    pick_from_container(container::root()).unwrap_or_else(|| {
        mycpu()
            .idle()
            .expect("pick_next: this core has no idle process")
    })
}

fn pick_from_container(cid: ContainerId) -> Option<ProcId> {
    let entries: Vec<(SchedNodeId, bool)> = container::arena().get(cid).index.iter().collect();
    for (node_id, is_container) in entries {
        if is_container {
            if let Some(child) = container_child_by_node(node_id) {
                if let Some(pid) = pick_from_container(child) {
                    return Some(pid);
                }
            }
        } else if let Some(pid) = proc_by_node(node_id) {
            container::arena().get_mut(cid).index.erase(node_id);
            return Some(pid);
        }
    }
    None
}

fn update_this_proc(next: ProcId) {
    process::arena().get_mut(next).state = ProcState::Running;
    mycpu().set_thisproc(Some(next));
    process::arena().get_mut(next).schinfo.lastrun = get_timestamp_ms() as i64;
    mycpu().set_timer(get_timestamp_ms(), SCHED_QUANTUM_MS);
}

/// Called from the timer interrupt path. Forces a reschedule once this
/// core's quantum has elapsed: a running process is demoted back to
/// `RUNNABLE` and re-enters its container's index; the idle process stays
/// idle (`update_this_state` skips vruntime/index bookkeeping for it) but
/// still re-runs `pick_next`, which is what lets an idle core pick up work
/// that became runnable since it last looked -- without this, a core with
/// nothing running when a process is activated would sit idle forever.
pub fn tick() {
    let cpu = mycpu();
    let now = get_timestamp_ms();
    if now < cpu.timer_deadline() {
        return;
    }

    lock().acquire();
    let is_idle = this_id()
        .map(|id| process::arena().get(id).idle)
        .unwrap_or(true);
    let new_state = if is_idle {
        ProcState::Running
    } else {
        ProcState::Runnable
    };
    simple_sched_locked(new_state);
}

/// The first thing a freshly created process runs: reached by `swtch`
/// "returning" into it, with `entry`/`arg` arriving the way `kcontext.x0`/
/// `x1` were seeded by `create_proc`/`start_proc`. Releases the sched lock
/// held across the switch that brought us here, then hands off to the
/// trap-return path to actually enter user mode at `entry`.
pub extern "C" fn proc_entry_trampoline(entry: u64, arg: u64) -> u64 {
    lock().release();
    if let Some(p) = this_proc() {
        p.ucontext.elr = entry;
    }
    arg
}

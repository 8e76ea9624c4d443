//! Process-lifecycle system calls reached via `SVC` from EL0. File-backed
//! syscalls are out of scope (see SPEC_FULL Non-goals); only the five
//! calls needed to drive process creation, termination and reaping are
//! dispatched here. Grounded in `original_source`'s `sys_fork`/`sys_exit`/
//! `sys_wait`/`sys_kill`/`sys_getpid`, adapted to this kernel's
//! `create_proc`+`start_proc` split instead of a single combined `fork()`.

use log::warn;

use crate::proc::{lifecycle, process};
use crate::proc::process::Proc;
use crate::sched::core;

pub const SYS_FORK: u64 = 1;
pub const SYS_EXIT: u64 = 2;
pub const SYS_WAIT: u64 = 3;
pub const SYS_KILL: u64 = 4;
pub const SYS_GETPID: u64 = 5;

/// AArch64 `SVC` convention this kernel follows: the syscall number
/// arrives in `x8`, the first argument in `x0`, and the return value is
/// written back into `x0` -- the same slot the trap-return path restores
/// into the real register on the way back to user space.
pub fn dispatch(p: &mut Proc) {
    let num = p.ucontext.x[8];
    let arg0 = p.ucontext.x[0];

    let ret = match num {
        SYS_FORK => sys_fork(),
        SYS_EXIT => sys_exit(arg0 as i32),
        SYS_WAIT => sys_wait(),
        SYS_KILL => sys_kill(arg0 as u32),
        SYS_GETPID => sys_getpid(),
        other => {
            warn!("pid {}: unknown syscall {}", p.pid, other);
            u64::MAX
        }
    };

    p.ucontext.x[0] = ret;
}

/// Clone the calling process: a fresh process record resuming at the
/// same `elr` the parent was about to return to, with `x0` forced to 0
/// so the child observes fork's own "you are the child" return value.
fn sys_fork() -> u64 {
    let parent = core::this_proc().expect("sys_fork: no current process");
    let parent_ucontext = parent.ucontext;

    match lifecycle::create_proc() {
        Some(child) => {
            lifecycle::set_parent_to_this(child);
            {
                let cp = process::arena().get_mut(child);
                cp.ucontext = parent_ucontext;
                cp.ucontext.x[0] = 0;
            }
            lifecycle::start_proc(child, parent_ucontext.elr, 0) as u64
        }
        None => u64::MAX,
    }
}

fn sys_exit(code: i32) -> u64 {
    lifecycle::exit(code);
}

fn sys_wait() -> u64 {
    match lifecycle::wait() {
        Some((pid, _code)) => pid as u64,
        None => u64::MAX,
    }
}

fn sys_kill(pid: u32) -> u64 {
    if lifecycle::kill(pid) {
        0
    } else {
        u64::MAX
    }
}

fn sys_getpid() -> u64 {
    core::this_pid() as u64
}

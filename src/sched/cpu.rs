//! Per-CPU state: which process (if any) is running here, the idle
//! fallback, nested `push_off` depth, and the preemption timer. Adapted
//! from the teacher's `Cpu<'a>` (there holding a `Context` for `swtch()`);
//! generalized to hold stable [`ProcId`] handles into the process arena
//! instead of borrowed references, since the scheduler moves processes
//! between CPUs across the sched-lock boundary.

use core::cell::Cell;

use crate::arch::regs::cpuid as arch_cpuid;
use crate::param::NCPU;
use crate::proc::process::ProcId;

pub struct Cpu {
    thisproc: Cell<Option<ProcId>>,
    idle: Cell<Option<ProcId>>,
    noff: Cell<u8>,
    intena: Cell<bool>,
    /// Monotonic deadline (ms) of this core's next preemption tick.
    timer_deadline: Cell<u64>,
}

impl Cpu {
    const fn new() -> Self {
        Cpu {
            thisproc: Cell::new(None),
            idle: Cell::new(None),
            noff: Cell::new(0),
            intena: Cell::new(false),
            timer_deadline: Cell::new(0),
        }
    }

    pub fn thisproc(&self) -> Option<ProcId> {
        self.thisproc.get()
    }

    pub fn set_thisproc(&self, p: Option<ProcId>) {
        self.thisproc.set(p);
    }

    pub fn idle(&self) -> Option<ProcId> {
        self.idle.get()
    }

    pub fn set_idle(&self, p: ProcId) {
        self.idle.set(Some(p));
    }

    pub fn noff(&self) -> u8 {
        self.noff.get()
    }

    pub fn inc_noff(&self) {
        self.noff.set(self.noff.get() + 1);
    }

    pub fn dec_noff(&self) {
        self.noff.set(self.noff.get() - 1);
    }

    pub fn intena(&self) -> bool {
        self.intena.get()
    }

    pub fn set_intena(&self, v: bool) {
        self.intena.set(v);
    }

    /// Reset this core's preemption clock relative to `now_ms`, arming the
    /// hardware comparator through [`crate::arch::clock::set_cpu_timer`].
    pub fn set_timer(&self, now_ms: u64, quantum_ms: u64) {
        let deadline = now_ms + quantum_ms;
        self.timer_deadline.set(deadline);
        crate::arch::clock::set_cpu_timer(deadline, cpuid());
    }

    pub fn cancel_timer(&self) {
        self.timer_deadline.set(u64::MAX);
        crate::arch::clock::cancel_cpu_timer(cpuid());
    }

    pub fn timer_deadline(&self) -> u64 {
        self.timer_deadline.get()
    }
}

unsafe impl Sync for Cpu {}

static CPUS: [Cpu; NCPU] = {
    const INIT: Cpu = Cpu::new();
    [INIT; NCPU]
};

/// The id (core-local index) of the CPU executing this code.
pub fn cpuid() -> usize {
    arch_cpuid() % NCPU
}

/// This CPU's per-core record. Interrupts need not be disabled to call this
/// (reading `cpuid()` is stable for the duration of a non-preempted kernel
/// call), but callers that stash the reference across a reschedule point
/// must re-fetch it afterward since the kernel may have migrated.
pub fn mycpu() -> &'static Cpu {
    &CPUS[cpuid()]
}

/// Indexed access to another core's record, needed only at boot to seed
/// every core's idle process before the other cores are up.
pub fn cpu_at(i: usize) -> &'static Cpu {
    &CPUS[i]
}

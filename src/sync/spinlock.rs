//! Spin lock with nested-interrupt-disable bookkeeping, generalized from
//! the teacher's RISC-V `Spinlock` (`sstatus`/AMO-swap) to the atomic
//! primitives in [`crate::arch::regs`].

use core::sync::atomic::AtomicBool;

use crate::arch::regs::{self, intr_get, intr_off, intr_on};
use crate::sched::cpu::{mycpu, Cpu};

pub struct Spinlock {
    locked: AtomicBool,
    name: &'static str,
    holder: Option<*const Cpu>,
}

unsafe impl Sync for Spinlock {}

impl Spinlock {
    pub const fn init_lock(name: &'static str) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            name,
            holder: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spin until acquired. Disables interrupts on this core for the
    /// duration (matched by [`push_off`]/[`pop_off`]) to avoid a deadlock
    /// against an interrupt handler that wants the same lock.
    pub fn acquire(&mut self) {
        push_off();
        if self.holding() {
            panic!("acquire: {}", self.name);
        }

        while regs::test_and_set(&self.locked) {
            core::hint::spin_loop();
        }
        regs::sync();

        self.holder = Some(mycpu() as *const Cpu);
    }

    /// Like [`acquire`](Self::acquire), but gives up immediately instead of
    /// spinning if the lock is currently held. Used by the slab allocator's
    /// per-page locks, where losing a race just means trying the next page.
    pub fn try_acquire(&mut self) -> bool {
        push_off();
        if self.holding() {
            panic!("try_acquire: {}", self.name);
        }
        if regs::test_and_set(&self.locked) {
            pop_off();
            return false;
        }
        regs::sync();
        self.holder = Some(mycpu() as *const Cpu);
        true
    }

    pub fn release(&mut self) {
        if !self.holding() {
            panic!("release: {}", self.name);
        }
        self.holder = None;
        regs::sync();
        regs::clear(&self.locked);
        pop_off();
    }

    fn holding(&self) -> bool {
        self.locked.load(core::sync::atomic::Ordering::Relaxed)
            && self.holder == Some(mycpu() as *const Cpu)
    }
}

/// Like `intr_off`/`intr_on` but matched: it takes as many `pop_off`s to
/// re-enable interrupts as there were `push_off`s. If interrupts were
/// already off on entry, they stay off.
pub fn push_off() {
    let old = intr_get();
    intr_off();
    let cpu = mycpu();
    if cpu.noff() == 0 {
        cpu.set_intena(old);
    }
    cpu.inc_noff();
}

pub fn pop_off() {
    let cpu = mycpu();
    if intr_get() {
        panic!("pop_off: interruptible");
    }
    if cpu.noff() < 1 {
        panic!("pop_off: unbalanced");
    }
    cpu.dec_noff();
    if cpu.noff() == 0 && cpu.intena() {
        intr_on();
    }
}

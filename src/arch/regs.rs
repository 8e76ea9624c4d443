//! Thin asm wrappers over the ARMv8-A system registers the kernel needs:
//! DAIF (interrupt mask), MPIDR_EL1 (cpu id), TTBR0_EL1 (active page table).
//!
//! Generalized from a RISC-V `sstatus`/`tp`/AMO-swap core to the AArch64
//! equivalents; the shape of each routine (read-modify-write a status
//! register, or a single `mrs`/`msr`) is unchanged.
//!
//! Under `cfg(test)` these bottom out in plain host state instead of real
//! `mrs`/`msr` -- the instructions below are AArch64-only and several are
//! EL1-privileged, so they cannot be assembled (let alone executed) by a
//! `cargo test` run on an ordinary host, matching the same `not(test)` split
//! [`crate`]'s own `#![cfg_attr(not(test), no_std)]` already draws.

use core::sync::atomic::{fence, AtomicBool, Ordering};

#[cfg(not(test))]
mod hw {
    use core::arch::asm;

    const DAIF_I_BIT: u64 = 1 << 7; // IRQ mask bit

    fn r_daif() -> u64 {
        let mut x: u64;
        unsafe { asm!("mrs {}, daif", out(reg) x) };
        x
    }

    fn w_daif(x: u64) {
        unsafe { asm!("msr daif, {}", in(reg) x) };
    }

    /// Enable device interrupts on this core.
    pub fn intr_on() {
        w_daif(r_daif() & !DAIF_I_BIT);
    }

    /// Disable device interrupts on this core.
    pub fn intr_off() {
        w_daif(r_daif() | DAIF_I_BIT);
    }

    /// Are device interrupts currently enabled on this core?
    pub fn intr_get() -> bool {
        (r_daif() & DAIF_I_BIT) == 0
    }

    /// Affinity0 field of MPIDR_EL1: the core id, used to index per-CPU arrays.
    pub fn cpuid() -> usize {
        let mpidr: u64;
        unsafe { asm!("mrs {}, mpidr_el1", out(reg) mpidr) };
        (mpidr & 0xff) as usize
    }

    /// Install `pt` (a physical address) as the root of the active user/kernel
    /// address space translation.
    pub fn set_ttbr0(pt: u64) {
        unsafe {
            asm!(
                "msr ttbr0_el1, {0}",
                "tlbi vmalle1is",
                "dsb ish",
                "isb",
                in(reg) pt,
            );
        }
    }
}

/// Host stand-in for the register file above: no EL0 process can actually
/// read `daif`/`mpidr_el1`/write `ttbr0_el1`, so the algorithmic core is
/// instead exercised against per-thread state that behaves the same way a
/// single core would (interrupts default enabled, one stable id per test
/// thread). Every lock-based subsystem's `#[cfg(test)]` tests go through
/// this path via [`crate::sync::Spinlock::acquire`]'s `push_off`.
#[cfg(test)]
mod hw {
    use core::cell::Cell;
    use core::sync::atomic::{AtomicUsize, Ordering};

    std::thread_local! {
        static INTR_ENABLED: Cell<bool> = const { Cell::new(true) };
        static TEST_CPU_ID: usize = alloc_test_cpu_id();
    }

    static NEXT_TEST_CPU_ID: AtomicUsize = AtomicUsize::new(0);

    fn alloc_test_cpu_id() -> usize {
        NEXT_TEST_CPU_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub fn intr_on() {
        INTR_ENABLED.with(|c| c.set(true));
    }

    pub fn intr_off() {
        INTR_ENABLED.with(|c| c.set(false));
    }

    pub fn intr_get() -> bool {
        INTR_ENABLED.with(|c| c.get())
    }

    /// Each host test thread gets its own stable "core id" (reduced modulo
    /// `NCPU` by [`crate::sched::cpu::cpuid`]), so two tests that happen to
    /// run concurrently never observe each other as the same core.
    pub fn cpuid() -> usize {
        TEST_CPU_ID.with(|id| *id)
    }

    pub fn set_ttbr0(_pt: u64) {}
}

pub use hw::{cpuid, intr_get, intr_off, intr_on, set_ttbr0};

/// Atomic test-and-set used by [`crate::sync::spinlock::Spinlock`].
///
/// Returns the previous value; the lock is acquired when it returns `false`.
pub fn test_and_set(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::Acquire)
}

/// Release the flag acquired by [`test_and_set`].
pub fn clear(flag: &AtomicBool) {
    flag.store(false, Ordering::Release);
}

/// Full two-way memory barrier, matching RISC-V `fence iorw, iorw` /
/// xv6's `__sync_synchronize`.
pub fn sync() {
    fence(Ordering::SeqCst);
}

//! Monotonic clock boundary, backed by the ARM generic timer
//! (`CNTPCT_EL0`/`CNTFRQ_EL0`). The scheduler only ever asks for
//! milliseconds since boot; it does not care how the count is produced.
//!
//! As in [`crate::arch::regs`], the real `mrs`/`msr` sequences are
//! AArch64-only and partly EL1-privileged; `cfg(test)` swaps in a host
//! clock so the scheduler core's time accounting can be exercised directly.

#[cfg(not(test))]
mod hw {
    use core::arch::asm;

    fn cntpct() -> u64 {
        let v: u64;
        unsafe { asm!("mrs {}, cntpct_el0", out(reg) v) };
        v
    }

    fn cntfrq() -> u64 {
        let v: u64;
        unsafe { asm!("mrs {}, cntfrq_el0", out(reg) v) };
        v
    }

    /// Milliseconds elapsed since the generic timer was started (effectively
    /// since boot, on this platform).
    pub fn get_timestamp_ms() -> u64 {
        let freq = cntfrq().max(1);
        cntpct().saturating_mul(1000) / freq
    }

    /// Arm this core's physical timer to fire `CNTP_EL0` at `deadline_ms`
    /// (the "comparator") and unmask it, tagging the write with `core_id`
    /// (the "key") purely for log correlation -- there is one timer
    /// register per core, so the key never changes which register is
    /// touched.
    pub fn set_cpu_timer(deadline_ms: u64, core_id: usize) {
        let freq = cntfrq().max(1);
        let deadline_ticks = (deadline_ms.saturating_mul(freq)) / 1000;
        unsafe {
            asm!("msr cntp_cval_el0, {}", in(reg) deadline_ticks);
            asm!("msr cntp_ctl_el0, {}", in(reg) 1u64, options(nomem, nostack));
        }
        let _ = core_id;
    }

    /// Disable this core's physical timer so it cannot raise a preemption IRQ.
    pub fn cancel_cpu_timer(core_id: usize) {
        unsafe { asm!("msr cntp_ctl_el0, {}", in(reg) 0u64, options(nomem, nostack)) };
        let _ = core_id;
    }
}

/// Host stand-in: a process-wide monotonic millisecond clock, and no-op
/// timer arm/disarm (nothing asynchronously interrupts a host test thread
/// the way a real comparator IRQ would).
#[cfg(test)]
mod hw {
    use std::time::Instant;

    fn epoch() -> &'static Instant {
        static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        EPOCH.get_or_init(Instant::now)
    }

    pub fn get_timestamp_ms() -> u64 {
        epoch().elapsed().as_millis() as u64
    }

    pub fn set_cpu_timer(_deadline_ms: u64, _core_id: usize) {}

    pub fn cancel_cpu_timer(_core_id: usize) {}
}

pub use hw::{cancel_cpu_timer, get_timestamp_ms, set_cpu_timer};

//! Trap/exception dispatch, grounded in the aarch64 `trap_global_handler`
//! this kernel's ancestor uses: classify by `ESR_EL1.EC`, route to an
//! interrupt handler, a syscall entry, or panic, then check for a pending
//! kill on the way back to user space.

use log::error;

use crate::arch::clock::get_timestamp_ms;
use crate::proc::lifecycle;
use crate::sched::core::this_proc;

/// Subset of `ESR_EL1.EC` values this kernel distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionClass {
    /// Unknown/unclassified reason, asynchronous IRQ is typically reported
    /// this way on this fault model.
    Unknown,
    /// `SVC` instruction executed at EL0: a system call.
    Svc64,
    /// Instruction or data abort taken from EL0.
    AbortLowerEl,
    /// Instruction or data abort taken from EL1 (a kernel bug).
    AbortSameEl,
}

impl ExceptionClass {
    /// Decode the `EC` field (bits 26..31) of a raw `ESR_EL1` value.
    pub fn decode(esr: u64) -> Self {
        match (esr >> 26) & 0x3f {
            0x15 => ExceptionClass::Svc64,
            0x20 | 0x24 => ExceptionClass::AbortLowerEl,
            0x21 | 0x25 => ExceptionClass::AbortSameEl,
            _ => ExceptionClass::Unknown,
        }
    }
}

/// Saved trap state handed to the handler: the raw `ESR_EL1`, the faulting
/// `ELR_EL1`, and the exception level the trap was taken from (`SPSR_EL1`
/// bits 0..3, zero meaning EL0).
pub struct TrapFrame {
    pub esr: u64,
    pub elr: u64,
    pub spsr: u64,
}

impl TrapFrame {
    pub fn from_el0(&self) -> bool {
        (self.spsr & 0xf) == 0
    }
}

/// Entry point reached from the assembly vector table for every
/// synchronous exception and IRQ taken at EL1.
pub fn trap_global_handler(tf: &TrapFrame) {
    if tf.from_el0() {
        if let Some(p) = this_proc() {
            p.schinfo.traptime = get_timestamp_ms() as i64;
        }
    }

    match ExceptionClass::decode(tf.esr) {
        ExceptionClass::Unknown => interrupt_global_handler(tf),
        ExceptionClass::Svc64 => syscall_entry(),
        ExceptionClass::AbortLowerEl | ExceptionClass::AbortSameEl => {
            panic!("page fault: elr={:#x} esr={:#x}", tf.elr, tf.esr);
        }
    }

    if tf.from_el0() {
        if let Some(p) = this_proc() {
            if p.killed() {
                lifecycle::exit(-1);
            }
        }
    }
}

fn interrupt_global_handler(_tf: &TrapFrame) {
    // IRQ routing (timer tick -> preemption, UART RX, virtio completion)
    // lives at the GIC boundary; only the preemption tick touches the core
    // subsystems, via `crate::sched::core::tick()`.
    crate::sched::core::tick();
}

fn syscall_entry() {
    if let Some(p) = this_proc() {
        crate::syscall::dispatch(p);
    }
}

/// Panics on any trap shape this kernel does not model.
pub fn trap_error_handler(tf: &TrapFrame) -> ! {
    error!("unhandled trap: esr={:#x} elr={:#x}", tf.esr, tf.elr);
    panic!("trap_error_handler");
}

//! Architecture boundary layer (ARMv8-A-flavored, generalized away from any
//! one concrete board).
//!
//! Everything in this module is deliberately thin: register names and a
//! handful of asm-backed intrinsics the rest of the kernel treats as given.
//! The interesting algorithms (scheduler, allocators, cache/log) never reach
//! through here directly except via the narrow functions exported below.

pub mod boot;
pub mod clock;
pub mod console;
pub mod memlayout;
pub mod regs;
pub mod trap;

pub use regs::{cpuid, intr_get, intr_off, intr_on, set_ttbr0};

//! Binary entry point. Boot sequencing proper (bringing the MMU, stacks
//! and exception level to a state where Rust can run at all) is out of
//! scope (see `SPEC_FULL.md` Non-goals) -- `_start` only has to get each
//! core's SP pointed at its slice of [`kernel::arch::boot`]'s boot stacks
//! and then jump into [`kernel::arch::boot::arch_start`], the way the
//! teacher's own `start()` hands off to `kmain` after the M-mode-to-S-mode
//! drop it performs is done. The panic handler, global allocator and
//! `kmain` itself live in `kernel::boot_glue` (see `lib.rs`), not here --
//! a binary crate may only link one of each.

#![no_std]
#![no_main]

use kernel::arch::regs::cpuid;

/// Reached directly from the reset vector, MMU off, one stack slot per
/// core already reserved by the linker script (not modeled here).
#[no_mangle]
pub unsafe extern "C" fn _start() -> ! {
    kernel::arch::boot::arch_start(cpuid());
}

//! Earliest-boot sequencing. Out of scope in depth (see Non-goals): this
//! brings each core up to EL1 with a private stack and jumps into `kmain`,
//! the way the teacher's `start()` drops RISC-V M-mode into S-mode before
//! calling `kmain`.

#[cfg(not(test))]
use core::arch::asm;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::param::{NCPU, PGSIZE};

#[repr(C, align(16))]
struct BootStacks([u8; PGSIZE * NCPU]);

#[no_mangle]
static BOOT_STACKS: BootStacks = BootStacks([0; PGSIZE * NCPU]);

/// Set once the boot core has finished bringing up the page pool, the
/// scheduler and the root container; secondary cores spin on this before
/// entering the scheduler loop.
pub static BOOT_DONE: AtomicBool = AtomicBool::new(false);

/// Entry point reached from the reset vector with the MMU off and SP_EL1
/// already pointed at this core's slice of [`BOOT_STACKS`].
///
/// Not compiled under `cfg(test)`: it is unreachable from a hosted test
/// binary (nothing calls it off a reset vector there) and its body masks
/// exceptions via `daifset`, an AArch64-only mnemonic a host assembler
/// cannot accept.
///
/// # Safety
/// Must only be called once per core, before any Rust state is touched.
#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn arch_start(core_id: usize) -> ! {
    let _ = core_id;
    asm!(
        "msr daifset, #0xf", // mask all exceptions until the scheduler is ready
        options(nomem, nostack),
    );
    crate::kmain();
}

pub fn wait_for_boot() {
    while !BOOT_DONE.load(Ordering::Acquire) {
        core::hint::spin_loop();
    }
}

pub fn mark_boot_done() {
    BOOT_DONE.store(true, Ordering::Release);
}

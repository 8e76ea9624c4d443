//! Educational ARMv8-A kernel: a hierarchical, container-aware completely
//! fair scheduler ([`sched`], [`proc`]) over a two-tier kernel allocator
//! ([`mm`]) and a crash-consistent block cache ([`fs`]). Architecture
//! boundary ([`arch`]) is deliberately thin -- see each module's own docs
//! for what is and is not in scope.
//!
//! `#![no_std]` except under `cfg(test)`, where the host `std` is used so
//! the algorithmic core (sched index, PID allocator, slab arithmetic, LRU
//! cache list, log absorption) can be exercised directly, the way
//! `Ollrogge-MiniatureOs/util/src/semaphore.rs` and its neighbors test
//! `no_std` kernel logic without a hardware target.

#![cfg_attr(not(test), no_std)]
#![allow(static_mut_refs)]

extern crate alloc;

pub mod arch;
pub mod fs;
pub mod logger;
pub mod mm;
pub mod param;
pub mod proc;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(not(any(test, feature = "kernel_as_a_lib")))]
pub use boot_glue::kmain;

#[cfg(not(any(test, feature = "kernel_as_a_lib")))]
mod boot_glue {
    use core::panic::PanicInfo;

    use log::LevelFilter;

    use crate::mm::slab::SlabAllocator;
    use crate::proc::{container, process};
    use crate::sched::{core as sched_core, cpu};

    #[global_allocator]
    static ALLOCATOR: SlabAllocator = SlabAllocator;

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        crate::printf!("\nkernel panic: {}\n", info);
        abort();
    }

    fn abort() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Reached once per core from [`crate::arch::boot::arch_start`]. Core 0
    /// brings every subsystem up in order (mirroring the teacher's
    /// `kmain`'s own init sequence: console, memory, processes, scheduler);
    /// secondary cores wait for that to finish, then join the same idle
    /// loop. Never returns.
    #[no_mangle]
    pub extern "C" fn kmain() -> ! {
        if cpu::cpuid() == 0 {
            crate::logger::init(LevelFilter::Info);
            crate::printf!("\narmv8 kernel booting...\n\n");

            crate::mm::page_pool::init();
            log::debug!("page pool initialized");

            process::init();
            let root = container::init();
            log::debug!("container {:?} is root", root);

            sched_core::init();
            log::debug!("scheduler initialized, {} core(s) seeded idle", crate::param::NCPU);

            // Block cache + write-ahead log bring-up needs a real
            // BlockDevice; wiring one up means a virtio driver, which is
            // out of scope here (see SPEC_FULL Non-goals). The subsystem
            // itself is fully implemented in `crate::fs::cache` and
            // exercised against `crate::fs::device::mock::RamDisk` in its
            // own tests rather than from this boot path.

            // No ELF loader exists to hand the first process a real entry
            // point (file-backed syscalls, and everything upstream of
            // them, are out of scope); process lifecycle itself is fully
            // wired and reachable via `crate::syscall::dispatch`.

            crate::arch::boot::mark_boot_done();
            log::info!("boot complete on core 0");
        } else {
            crate::arch::boot::wait_for_boot();
        }

        idle_loop();
    }

    fn idle_loop() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}

//! Physical memory layout for the reference platform this kernel targets:
//! an aarch64 QEMU `virt`-style machine. Generalized from a RISC-V
//! `virt`-machine layout (CLINT/PLIC at fixed MMIO offsets) to the
//! GICv2 + PL011 + generic-timer layout real aarch64 "virt" boards use.

use crate::param::PGSIZE;

/// PL011 UART registers.
pub const UART0: usize = 0x0900_0000;
pub const UART0_IRQ: usize = 33;

/// virtio-mmio transport for the block device.
pub const VIRTIO0: usize = 0x0a00_0000;
pub const VIRTIO0_IRQ: usize = 48;

/// GICv2 distributor and CPU interface, used to route and ack IRQs.
pub const GICD_BASE: usize = 0x0800_0000;
pub const GICC_BASE: usize = 0x0801_0000;

/// RAM usable by the kernel and user pages.
pub const KERNBASE: usize = 0x4000_0000;
pub const PHYSTOP: usize = KERNBASE + 128 * 1024 * 1024;

/// Highest virtual address a page-table walk can name with four levels of
/// 9-bit indices plus a 12-bit page offset.
pub const MAXVA: usize = 1 << (9 + 9 + 9 + 9 + 12 - 1);

/// Single high page mapped identically in every address space, used by the
/// trap return path the way the teacher's trampoline page is.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;

/// Per-process kernel stack slot below the trampoline, each surrounded by
/// an unmapped guard page.
pub fn kstack(local_slot: usize) -> usize {
    TRAMPOLINE - (local_slot + 1) * 2 * PGSIZE
}

/// Where a process's saved user trap frame lives in its own address space.
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;

//! Four-level AArch64-style page directory (component C). Grounded in
//! `original_source/src/kernel/pt.c`'s `get_pte`/`free_pgdir`/`attach_pgdir`,
//! adapted from the teacher's RISC-V three-level `walk`/`freewalk`
//! (`vm.rs`) by adding the extra table level AArch64's 4KB granule needs
//! and replacing its recursive `&mut PageTable` borrows with raw pointers,
//! since a table may be shared momentarily with the attached hardware walker.
//!
//! Addresses here are physical; this kernel runs the same identity-style
//! direct map the teacher's `kvmmake` sets up, so no `K2P`/`P2K` translation
//! is needed between a `PageDirectory`'s own bookkeeping and the addresses
//! it stores.

use crate::arch::regs;
use crate::mm::page_pool;
use crate::param::N_PTE_PER_TABLE;

const PTE_VALID: u64 = 1 << 0;
/// Set on levels 0-2 to mean "points at another table" rather than a leaf
/// block mapping (this kernel never uses block mappings, only 4KB pages).
const PTE_TABLE: u64 = 1 << 1;

const PAGE_SHIFT: usize = 12;
const IDX_BITS: usize = 9;
const IDX_MASK: usize = (1 << IDX_BITS) - 1;

fn va_part(va: usize, level: usize) -> usize {
    (va >> (PAGE_SHIFT + IDX_BITS * level)) & IDX_MASK
}

fn pte_address(pte: u64) -> usize {
    (pte & !0xfff) as usize
}

/// A process's (or the kernel's) root page table, named the way the
/// original names its per-process `struct pgdir`.
pub struct PageDirectory {
    pt0: *mut u64,
}

unsafe impl Send for PageDirectory {}

impl PageDirectory {
    /// An address space with no page table allocated yet, matching
    /// `init_pgdir`'s `pgdir->pt = NULL`.
    pub const fn empty() -> Self {
        PageDirectory {
            pt0: core::ptr::null_mut(),
        }
    }

    fn table(addr: usize) -> *mut u64 {
        addr as *mut u64
    }

    fn alloc_table() -> Option<*mut u64> {
        let page = page_pool::alloc_page()?;
        let pt = Self::table(page);
        unsafe {
            for i in 0..N_PTE_PER_TABLE {
                *pt.add(i) = 0;
            }
        }
        Some(pt)
    }

    /// Return a pointer to the leaf PTE for `va`, walking (and, if `alloc`,
    /// creating) the intermediate table levels on the way down. Returns
    /// `None` if an intermediate table is missing and `alloc` is false, or
    /// if the page pool is exhausted while allocating one.
    pub fn get_pte(&mut self, va: usize, alloc: bool) -> Option<*mut u64> {
        if self.pt0.is_null() {
            if !alloc {
                return None;
            }
            self.pt0 = Self::alloc_table()?;
        }

        let mut table = self.pt0;
        // Levels 3, 2, 1 hold pointers to the next table; level 0 holds the
        // leaf entry, matching `VA_PART0..VA_PART3` ordering in the
        // original (part0 is the top level, part3 the leaf).
        for level in (1..=3).rev() {
            let idx = va_part(va, level);
            let entry = unsafe { *table.add(idx) };
            table = if entry & PTE_VALID != 0 {
                Self::table(pte_address(entry))
            } else {
                if !alloc {
                    return None;
                }
                let next = Self::alloc_table()?;
                unsafe {
                    *table.add(idx) = next as u64 | PTE_VALID | PTE_TABLE;
                }
                next
            };
        }

        let leaf_idx = va_part(va, 0);
        Some(unsafe { table.add(leaf_idx) })
    }

    /// Tear down every table page (not the pages they describe) this
    /// directory owns, then mark it empty. A no-op if no table was ever
    /// allocated.
    pub fn free(&mut self) {
        if self.pt0.is_null() {
            return;
        }

        unsafe {
            for i0 in 0..N_PTE_PER_TABLE {
                let e0 = *self.pt0.add(i0);
                if e0 & PTE_VALID == 0 {
                    continue;
                }
                let pt1 = Self::table(pte_address(e0));
                for i1 in 0..N_PTE_PER_TABLE {
                    let e1 = *pt1.add(i1);
                    if e1 & PTE_VALID == 0 {
                        continue;
                    }
                    let pt2 = Self::table(pte_address(e1));
                    for i2 in 0..N_PTE_PER_TABLE {
                        let e2 = *pt2.add(i2);
                        if e2 & PTE_VALID == 0 {
                            continue;
                        }
                        page_pool::free_page(pte_address(e2));
                    }
                    page_pool::free_page(pt2 as usize);
                }
                page_pool::free_page(pt1 as usize);
            }
            page_pool::free_page(self.pt0 as usize);
        }
        self.pt0 = core::ptr::null_mut();
    }

    /// Install this directory as the active translation for the running
    /// core. An empty directory installs a fault-everything mapping
    /// instead of leaving the previous process's table live.
    pub fn attach(&self) {
        if !self.pt0.is_null() {
            regs::set_ttbr0(self.pt0 as u64);
        } else {
            regs::set_ttbr0(0);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pt0.is_null()
    }
}

//! Per-CPU small-object allocator (component B): headered pages carved from
//! [`crate::mm::page_pool`], each page linearly walked as a chain of
//! block headers. Grounded in `original_source/src/kernel/mem.c`'s
//! `kalloc`/`kfree_1`, whose single global `first_page` chain is split one
//! chain per CPU here (see the module note in `SPEC_FULL.md` §4.B) the way
//! the teacher's own per-CPU `Cpu` record splits other global resources.
//!
//! This backs the crate's `#[global_allocator]`.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr;

use log::trace;

use crate::mm::page_pool;
use crate::param::{NCPU, PGSIZE};
use crate::sched::cpu::cpuid;
use crate::sync::Spinlock;

/// Prepended to a page when it is carved for the small-object allocator.
#[repr(C)]
struct PageHeader {
    /// Guards this page's block-header chain and `max_free` hint. Scanned
    /// non-blocking (`try_acquire`) by [`alloc`] so a contended page is
    /// skipped rather than waited on.
    lock: Spinlock,
    next: *mut PageHeader,
    /// Upper bound hint: no free block in this page exceeds this size.
    /// Invariant (whenever `lock` is released): equal to the true max.
    max_free: u32,
    /// Which CPU's chain this page is linked into, needed so `free` can
    /// unlink it without knowing in advance who allocated it.
    owner_cpu: usize,
}

/// Prepended to every allocation carved out of a [`PageHeader`]'s page.
#[repr(C)]
struct BlockHeader {
    /// Points to the block header immediately preceding this one in
    /// physical order, or to itself for the first block in a page.
    /// Per the open question in the module docs, this predecessor link is
    /// never used to coalesce on free (reproducing a documented bug in the
    /// original rather than silently fixing it).
    prev: *mut BlockHeader,
    size: u32,
    used: bool,
}

const HDR_PAGE: usize = size_of::<PageHeader>();
const HDR_BLOCK: usize = size_of::<BlockHeader>();
/// Total free-block capacity of a freshly carved page.
const PAGE_PAYLOAD: usize = PGSIZE - HDR_PAGE - HDR_BLOCK;

fn round8(size: usize) -> usize {
    (size + 7) & !7
}

static mut CHAIN_HEADS: [*mut PageHeader; NCPU] = [ptr::null_mut(); NCPU];
static mut CHAIN_LOCKS: [Spinlock; NCPU] = {
    const INIT: Spinlock = Spinlock::init_lock("slab_chain");
    [INIT; NCPU]
};

fn chain_lock(cpu: usize) -> &'static mut Spinlock {
    unsafe { &mut CHAIN_LOCKS[cpu] }
}

/// Carve a fresh frame into one maximal free block and link it at the head
/// of `cpu`'s chain.
fn carve_new_page(cpu: usize) -> *mut PageHeader {
    let page = page_pool::alloc_page().expect("slab: page pool exhausted");
    let pg_ptr = page as *mut PageHeader;
    unsafe {
        ptr::write(
            pg_ptr,
            PageHeader {
                lock: Spinlock::init_lock("slab_page"),
                next: ptr::null_mut(),
                max_free: PAGE_PAYLOAD as u32,
                owner_cpu: cpu,
            },
        );
        let blk = (page + HDR_PAGE) as *mut BlockHeader;
        ptr::write(
            blk,
            BlockHeader {
                prev: blk,
                size: PAGE_PAYLOAD as u32,
                used: false,
            },
        );
    }

    chain_lock(cpu).acquire();
    unsafe {
        (*pg_ptr).next = CHAIN_HEADS[cpu];
        CHAIN_HEADS[cpu] = pg_ptr;
    }
    chain_lock(cpu).release();
    trace!("slab: carved fresh page for cpu {}", cpu);
    pg_ptr
}

/// Recompute the true maximum free block size by scanning every block in
/// the page. Caller holds the page's lock.
unsafe fn recompute_max_free(pg_ptr: *mut PageHeader) -> u32 {
    let page_end = pg_ptr as usize + PGSIZE;
    let mut blk = (pg_ptr as usize + HDR_PAGE) as *mut BlockHeader;
    let mut max = 0u32;
    while (blk as usize) < page_end {
        let b = &*blk;
        if !b.used && b.size > max {
            max = b.size;
        }
        blk = ((blk as usize) + HDR_BLOCK + b.size as usize) as *mut BlockHeader;
    }
    max
}

/// Try to carve `size` bytes out of `pg_ptr`. Caller holds the page's lock
/// and has already checked `max_free >= size`. Returns the payload address
/// on success.
unsafe fn carve_from_page(pg_ptr: *mut PageHeader, size: usize) -> Option<*mut u8> {
    let page_end = pg_ptr as usize + PGSIZE;
    let mut blk = (pg_ptr as usize + HDR_PAGE) as *mut BlockHeader;
    loop {
        if (blk as usize) >= page_end {
            return None;
        }
        let b = &mut *blk;
        if !b.used && b.size as usize >= size {
            break;
        }
        blk = ((blk as usize) + HDR_BLOCK + b.size as usize) as *mut BlockHeader;
    }

    let b = &mut *blk;
    let was_hint = b.size == (*pg_ptr).max_free;
    let remainder = b.size as usize - size;
    if remainder <= HDR_BLOCK {
        b.used = true;
    } else {
        let new_blk_addr = (blk as usize) + HDR_BLOCK + size;
        let new_blk = new_blk_addr as *mut BlockHeader;
        let new_size = (remainder - HDR_BLOCK) as u32;
        ptr::write(
            new_blk,
            BlockHeader {
                prev: blk,
                size: new_size,
                used: false,
            },
        );
        b.size = size as u32;
        b.used = true;

        let after_addr = new_blk_addr + HDR_BLOCK + new_size as usize;
        if after_addr < page_end {
            (*(after_addr as *mut BlockHeader)).prev = new_blk;
        }
    }

    if was_hint {
        (*pg_ptr).max_free = recompute_max_free(pg_ptr);
    }

    Some((blk as usize + HDR_BLOCK) as *mut u8)
}

/// Allocate `size` bytes (rounded up to 8), from the current CPU's chain of
/// slab pages, pulling a fresh page from the page pool on a miss.
pub fn alloc(size: usize) -> *mut u8 {
    let size = round8(size.max(1));
    debug_assert!(
        size <= PAGE_PAYLOAD,
        "slab: allocation of {} bytes exceeds a page's payload",
        size
    );

    let cpu = cpuid();
    loop {
        chain_lock(cpu).acquire();
        let mut pg_ptr = unsafe { CHAIN_HEADS[cpu] };
        chain_lock(cpu).release();

        while !pg_ptr.is_null() {
            let pg = unsafe { &mut *pg_ptr };
            if pg.lock.try_acquire() {
                if pg.max_free as usize >= size {
                    if let Some(addr) = unsafe { carve_from_page(pg_ptr, size) } {
                        pg.lock.release();
                        return addr;
                    }
                }
                pg.lock.release();
            }
            pg_ptr = unsafe { (*pg_ptr).next };
        }

        carve_new_page(cpu);
        // loop again: the fresh page is guaranteed to fit `size`.
    }
}

/// Free a payload previously returned by [`alloc`]. Coalesces with the
/// physically next block if it is free; does NOT coalesce with the
/// previous block (see [`BlockHeader::prev`] docs -- an intentionally
/// reproduced upstream limitation, not an oversight).
pub fn free(p: *mut u8) {
    let pg_addr = (p as usize) & !(PGSIZE - 1);
    let pg_ptr = pg_addr as *mut PageHeader;
    let mut now_empty = false;
    let mut owner = 0usize;

    unsafe {
        (*pg_ptr).lock.acquire();
        let page_end = pg_addr + PGSIZE;
        let blk = (p as usize - HDR_BLOCK) as *mut BlockHeader;
        (*blk).used = false;

        let next_addr = blk as usize + HDR_BLOCK + (*blk).size as usize;
        if next_addr < page_end {
            let next = next_addr as *mut BlockHeader;
            if !(*next).used {
                (*blk).size += HDR_BLOCK as u32 + (*next).size;
                let after_addr = blk as usize + HDR_BLOCK + (*blk).size as usize;
                if after_addr < page_end {
                    (*(after_addr as *mut BlockHeader)).prev = blk;
                }
            }
        }

        if (*blk).size > (*pg_ptr).max_free {
            (*pg_ptr).max_free = (*blk).size;
        }
        now_empty = (*pg_ptr).max_free as usize == PAGE_PAYLOAD;
        owner = (*pg_ptr).owner_cpu;
        (*pg_ptr).lock.release();
    }

    if now_empty {
        chain_lock(owner).acquire();
        unsafe {
            if CHAIN_HEADS[owner] == pg_ptr {
                CHAIN_HEADS[owner] = (*pg_ptr).next;
            } else {
                let mut cur = CHAIN_HEADS[owner];
                while !cur.is_null() {
                    let nxt = (*cur).next;
                    if nxt == pg_ptr {
                        (*cur).next = (*pg_ptr).next;
                        break;
                    }
                    cur = nxt;
                }
            }
        }
        chain_lock(owner).release();
        page_pool::free_page(pg_addr);
    }
}

/// Backs the crate's `#[global_allocator]`: every `Vec`/`Box` allocation in
/// the algorithmic core ultimately bottoms out here, the way the teacher's
/// (unimplemented) `NoopAllocator` was meant to bottom out in `KMem`.
pub struct SlabAllocator;

unsafe impl GlobalAlloc for SlabAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // The slab carves 8-byte-aligned blocks; anything asking for
        // coarser alignment than that is out of scope for this educational
        // allocator and would need a page-aligned fallback (not needed by
        // anything in this crate's algorithmic core).
        debug_assert!(layout.align() <= 8);
        alloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        free(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round8_rounds_up() {
        assert_eq!(round8(1), 8);
        assert_eq!(round8(8), 8);
        assert_eq!(round8(9), 16);
    }
}

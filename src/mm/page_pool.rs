//! Free-page pool (component A): a spin-protected singly linked list of
//! physical frames. Grounded in `original_source/src/kernel/mem.c`'s
//! `kalloc_page`/`kfree_page` pair over its `phead` queue, adapted from the
//! teacher's `KMem` (`kalloc.rs`), which carves the same `end..PHYSTOP`
//! range the same way but does not split per-CPU (that split lives one
//! layer up, in [`crate::mm::slab`]).

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};

use crate::arch::memlayout::PHYSTOP;
use crate::param::PGSIZE;
use crate::sync::Spinlock;

extern "C" {
    /// First address after the kernel image, defined by the linker script.
    static end: u8;
}

struct Run {
    next: *mut Run,
}

struct PagePool {
    lock: Spinlock,
    freelist: *mut Run,
}

unsafe impl Sync for PagePool {}

static mut POOL: PagePool = PagePool {
    lock: Spinlock::init_lock("page_pool"),
    freelist: ptr::null_mut(),
};

/// Number of frames currently checked out of the pool, for observability
/// (the original's `alloc_page_cnt` `RefCount`, exposed here as a plain
/// atomic rather than a bespoke refcount type).
static LIVE_PAGES: AtomicUsize = AtomicUsize::new(0);

fn pgroundup(a: usize) -> usize {
    (a + PGSIZE - 1) & !(PGSIZE - 1)
}

fn pgrounddown(a: usize) -> usize {
    a & !(PGSIZE - 1)
}

/// Must run exactly once at boot, before any other subsystem allocates a
/// page. Walks physical memory from the end of the kernel image to
/// `PHYSTOP`, inserting every frame into the free list.
pub fn init() {
    let start = pgroundup(unsafe { &end as *const u8 as usize });
    let mut p = start;
    while p + PGSIZE <= PHYSTOP {
        push_free(p);
        p += PGSIZE;
    }
    info!(
        "page pool initialized: {} frames free ({:#x}..{:#x})",
        (PHYSTOP - start) / PGSIZE,
        start,
        PHYSTOP
    );
}

/// Link a frame onto the free list without touching [`LIVE_PAGES`]. Used
/// both by [`init`], which is seeding never-allocated frames, and by
/// [`free_page`], which has already accounted for the frame it is
/// returning.
fn push_free(p: usize) {
    assert_eq!(p % PGSIZE, 0, "push_free: unaligned {:#x}", p);
    let r = pgrounddown(p) as *mut Run;
    unsafe {
        POOL.lock.acquire();
        (*r).next = POOL.freelist;
        POOL.freelist = r;
        POOL.lock.release();
    }
}

/// Allocate one physical frame. Returns `None` if the pool is exhausted;
/// callers for which this is a critical allocation (bringing up a fresh
/// page directory level, carving a fresh slab page) are expected to
/// `.expect()` this per the "out-of-memory for a critical page" panic
/// named in the error-handling design, while routine allocations (a
/// process's kernel stack) propagate `None` up through their own
/// `Option`-returning callers instead.
pub fn alloc_page() -> Option<usize> {
    let addr = unsafe {
        POOL.lock.acquire();
        let r = POOL.freelist;
        let addr = if r.is_null() {
            None
        } else {
            POOL.freelist = (*r).next;
            Some(r as usize)
        };
        POOL.lock.release();
        addr
    };
    if addr.is_none() {
        warn!("page pool exhausted");
    } else {
        LIVE_PAGES.fetch_add(1, Ordering::Relaxed);
    }
    addr
}

/// Return a frame previously handed out by [`alloc_page`] (or, during
/// [`init`], any frame in the walked range) to the pool.
pub fn free_page(p: usize) {
    push_free(p);
    LIVE_PAGES.fetch_sub(1, Ordering::Relaxed);
}

/// Frames currently checked out of the pool.
pub fn live_pages() -> usize {
    LIVE_PAGES.load(Ordering::Relaxed)
}

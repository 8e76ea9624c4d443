//! Block cache with write-ahead log (components G and H, kept in one
//! module the way `original_source/src/fs/cache.c` keeps both in one
//! file): an LRU-indexed cache of fixed-size blocks ([`crate::fs::block`])
//! layered with a transactional group-commit log giving crash
//! consistency across `begin_op`/`sync`/`end_op` windows.
//!
//! Lock order, never reversed (SPEC_FULL §5): cache list lock, then
//! `op_num_lock` -> `log.lock` -> `op_head_lock`.

use core::mem::size_of;

use alloc::vec::Vec;

use log::{debug, info, trace};

use crate::fs::bitmap;
use crate::fs::block::{BlockFlags, BlockId, CacheList};
use crate::fs::device::{BlockDevice, SuperBlock};
use crate::param::{BLOCK_SIZE, EVICTION_THRESHOLD, LOG_MAX_SIZE, OP_MAX_NUM_BLOCKS};
use crate::sync::{Semaphore, Spinlock};

/// On-disk (and in-memory mirror of the) log header block. Invariant
/// (§3): `num_blocks == 0` on disk iff no commit is in progress.
#[derive(Clone, Copy)]
#[repr(C)]
struct LogHeader {
    num_blocks: u32,
    block_no: [u32; LOG_MAX_SIZE],
}

impl LogHeader {
    const fn empty() -> Self {
        LogHeader {
            num_blocks: 0,
            block_no: [0; LOG_MAX_SIZE],
        }
    }
}

/// The shared, deduped list of blocks touched by the current commit
/// window. Pure bookkeeping -- guarded externally by `log_lock()`, the
/// same split [`CacheList`] draws from its own lock.
struct Log {
    bno: Vec<u32>,
}

impl Log {
    const fn new() -> Self {
        Log { bno: Vec::new() }
    }

    /// Global absorption: merge `new` into this commit window's list,
    /// skipping entries already present. Returns how many of `new` were
    /// already logged (an already-logged block needs no fresh log-space
    /// reservation, which is how `end_op` computes how much of its
    /// admission to return).
    fn absorb(&mut self, new: &[u32]) -> usize {
        let mut absorbed = 0;
        for &bno in new {
            if self.bno.contains(&bno) {
                absorbed += 1;
            } else {
                assert!(
                    self.bno.len() < LOG_MAX_SIZE - 1,
                    "log: commit window exceeds LOG_MAX_SIZE"
                );
                self.bno.push(bno);
            }
        }
        absorbed
    }
}

/// A caller's transaction handle, returned by [`begin_op`] and consumed by
/// [`end_op`]. Holds its own local (not yet globally absorbed) list of
/// touched block numbers, bounded by `OP_MAX_NUM_BLOCKS`, and the signal
/// `end_op` blocks on until commit is durable.
pub struct OpContext {
    bno: Vec<u32>,
    ok: Semaphore,
}

impl OpContext {
    fn new() -> Self {
        OpContext {
            bno: Vec::new(),
            ok: Semaphore::new(0),
        }
    }
}

static mut CACHE_LIST: CacheList = CacheList::new();
static mut CACHE_LOCK: Spinlock = Spinlock::init_lock("bcache");

static mut LOG: Log = Log::new();
static mut LOG_LOCK: Spinlock = Spinlock::init_lock("log");

static mut OP_NUM_LOCK: Spinlock = Spinlock::init_lock("op_num");
static mut RUNNING_OP_NUM: i64 = 0;
static mut REMAINING_LOG_NUM: i64 = 0;
/// Counting semaphore signaling commit-window capacity is available.
/// `original_source` declares this a `SleepLock` initialized with no
/// explicit permit count; this rendition resolves that silently-assumed
/// Open Question by starting it at 1 permit, matching "capacity is
/// available at mount time" (otherwise the very first `begin_op` would
/// block forever with nothing yet to post it).
static mut OP_AVAILABLE: Semaphore = Semaphore::new(1);

static mut OP_HEAD_LOCK: Spinlock = Spinlock::init_lock("op_head");
static mut PENDING: Vec<*mut OpContext> = Vec::new();

static mut DEVICE: Option<&'static dyn BlockDevice> = None;
static mut SBLOCK: Option<SuperBlock> = None;

fn cache_lock() -> &'static mut Spinlock {
    unsafe { &mut CACHE_LOCK }
}

fn cache_list() -> &'static mut CacheList {
    unsafe { &mut CACHE_LIST }
}

fn log_lock() -> &'static mut Spinlock {
    unsafe { &mut LOG_LOCK }
}

fn log_state() -> &'static mut Log {
    unsafe { &mut LOG }
}

fn op_num_lock() -> &'static mut Spinlock {
    unsafe { &mut OP_NUM_LOCK }
}

fn op_available() -> &'static mut Semaphore {
    unsafe { &mut OP_AVAILABLE }
}

fn op_head_lock() -> &'static mut Spinlock {
    unsafe { &mut OP_HEAD_LOCK }
}

fn pending() -> &'static mut Vec<*mut OpContext> {
    unsafe { &mut PENDING }
}

fn running_op_num() -> i64 {
    unsafe { RUNNING_OP_NUM }
}

fn set_running_op_num(v: i64) {
    unsafe { RUNNING_OP_NUM = v };
}

fn remaining_log_num() -> i64 {
    unsafe { REMAINING_LOG_NUM }
}

fn set_remaining_log_num(v: i64) {
    unsafe { REMAINING_LOG_NUM = v };
}

fn device() -> &'static dyn BlockDevice {
    unsafe { DEVICE.expect("cache: not initialized") }
}

fn sblock() -> &'static SuperBlock {
    unsafe { SBLOCK.as_ref().expect("cache: not initialized") }
}

fn log_start() -> u32 {
    sblock().log_start
}

fn bm_bno() -> u32 {
    sblock().bitmap_start
}

fn device_read(block_no: u32, buf: &mut [u8; BLOCK_SIZE]) {
    device().read(block_no, buf);
}

fn device_write(block_no: u32, buf: &[u8; BLOCK_SIZE]) {
    device().write(block_no, buf);
}

fn read_header() -> LogHeader {
    let mut buf = [0u8; BLOCK_SIZE];
    device_read(log_start(), &mut buf);
    unsafe { (buf.as_ptr() as *const LogHeader).read_unaligned() }
}

fn write_header(header: &LogHeader) {
    let mut buf = [0u8; BLOCK_SIZE];
    unsafe { (buf.as_mut_ptr() as *mut LogHeader).write_unaligned(*header) };
    device_write(log_start(), &buf);
}

/// Bring up the block cache and log over `device`/`sblock`. Must run
/// exactly once at mount time, before any other `cache::` call. Replays
/// any committed-but-not-installed transaction left by a prior crash.
pub fn init(device: &'static dyn BlockDevice, sblock: SuperBlock) {
    assert!(
        size_of::<LogHeader>() < BLOCK_SIZE,
        "cache::init: log header does not fit in one block"
    );
    unsafe {
        DEVICE = Some(device);
        SBLOCK = Some(sblock);
    }
    set_running_op_num(0);
    set_remaining_log_num(sblock.num_log_blocks.min(LOG_MAX_SIZE as u32) as i64);
    pending().clear();
    log_state().bno.clear();

    replay();
    info!(
        "block cache initialized: {} log blocks, eviction threshold {}",
        sblock.num_log_blocks, EVICTION_THRESHOLD
    );
}

/// At-mount replay (§4.H "Replay"): if the on-disk header names a
/// committed transaction, copy every logged block back to its home
/// location before anything else touches the cache, then zero the header.
fn replay() {
    let header = read_header();
    if header.num_blocks > 0 {
        info!(
            "log: replaying {} block(s) left by a prior crash",
            header.num_blocks
        );
        let mut buf = [0u8; BLOCK_SIZE];
        for i in 0..header.num_blocks as usize {
            device_read(log_start() + 1 + i as u32, &mut buf);
            device_write(header.block_no[i], &buf);
        }
    }
    write_header(&LogHeader::empty());
}

fn evict_if_needed() {
    while cache_list().len() > EVICTION_THRESHOLD {
        match cache_list().evict_candidate() {
            Some(id) => cache_list().remove(id),
            None => break,
        }
    }
}

/// Fetch block `block_no`, blocking until it is exclusively held by the
/// caller. Grounded in `original_source`'s `cache_acquire`: on a cache
/// miss, the list lock is held across the device read so two racing
/// misses on the same block cannot both insert a record -- reproduced
/// here rather than narrowed to a smaller critical section.
pub fn acquire(block_no: u32) -> BlockId {
    cache_lock().acquire();
    if let Some(id) = cache_list().find(block_no) {
        cache_list().get_mut(id).pending += 1;
        cache_lock().release();

        cache_list().get_mut(id).lock.acquire_sleep();

        cache_lock().acquire();
        cache_list().get_mut(id).pending -= 1;
        debug_assert!(
            !cache_list().get(id).acquired(),
            "acquire: block {} already held",
            block_no
        );
        cache_list().get_mut(id).flags.insert(BlockFlags::ACQUIRED);
        cache_list().touch(id);
        evict_if_needed();
        cache_lock().release();
        return id;
    }

    let id = cache_list().insert(block_no);
    {
        let b = cache_list().get_mut(id);
        device_read(block_no, &mut b.data);
        b.flags.insert(BlockFlags::VALID | BlockFlags::ACQUIRED);
    }
    cache_list().get_mut(id).lock.acquire_sleep();
    evict_if_needed();
    cache_lock().release();
    trace!("cache: fetched block {} from device", block_no);
    id
}

/// Release a block previously returned by [`acquire`]. The block must not
/// be used again afterward.
pub fn release(id: BlockId) {
    cache_lock().acquire();
    cache_list().get_mut(id).flags.remove(BlockFlags::ACQUIRED);
    cache_lock().release();
    cache_list().get_mut(id).lock.release_sleep();
}

pub fn get_num_cached_blocks() -> usize {
    cache_lock().acquire();
    let n = cache_list().len();
    cache_lock().release();
    n
}

/// Read a held block's current contents.
pub fn read(id: BlockId) -> [u8; BLOCK_SIZE] {
    cache_lock().acquire();
    let data = cache_list().get(id).data;
    cache_lock().release();
    data
}

/// Overwrite a held block's contents. Does not by itself make the write
/// durable -- call [`sync`] to either log it (inside a transaction) or
/// write it straight through (`ctx = None`).
pub fn write(id: BlockId, data: &[u8; BLOCK_SIZE]) {
    cache_lock().acquire();
    cache_list().get_mut(id).data = *data;
    cache_lock().release();
}

/// Record that `id` was modified as part of `ctx`'s transaction (local
/// absorption if already touched by this op), or -- if `ctx` is `None` --
/// write it straight to the device immediately, bypassing the log.
pub fn sync(ctx: Option<&mut OpContext>, id: BlockId) {
    match ctx {
        None => {
            let data = read(id);
            let block_no = cache_list_block_no(id);
            device_write(block_no, &data);
        }
        Some(ctx) => {
            let block_no = cache_list_block_no(id);
            if !ctx.bno.contains(&block_no) {
                assert!(
                    ctx.bno.len() < OP_MAX_NUM_BLOCKS,
                    "sync: op exceeds OP_MAX_NUM_BLOCKS"
                );
                ctx.bno.push(block_no);
            }
            cache_lock().acquire();
            cache_list().get_mut(id).flags.insert(BlockFlags::PINNED);
            cache_lock().release();
        }
    }
}

fn cache_list_block_no(id: BlockId) -> u32 {
    cache_lock().acquire();
    let bno = cache_list().get(id).block_no;
    cache_lock().release();
    bno
}

/// Admission: reserve `OP_MAX_NUM_BLOCKS` log slots for a new
/// transaction, blocking (uninterruptibly -- a filesystem op must not be
/// abandoned mid-flight) until capacity is available.
pub fn begin_op() -> OpContext {
    loop {
        op_available().wait_uninterruptible();
        op_num_lock().acquire();
        if remaining_log_num() >= OP_MAX_NUM_BLOCKS as i64 {
            set_remaining_log_num(remaining_log_num() - OP_MAX_NUM_BLOCKS as i64);
            if remaining_log_num() >= OP_MAX_NUM_BLOCKS as i64 {
                op_available().post();
            }
            break;
        }
        op_num_lock().release();
    }
    set_running_op_num(running_op_num() + 1);
    op_num_lock().release();
    OpContext::new()
}

/// Close out a transaction: globally absorb its touched blocks, return
/// unused admission, and -- if this was the last in-flight op -- run
/// group commit. Blocks until the commit covering this op is durable.
pub fn end_op(mut ctx: OpContext) {
    log_lock().acquire();
    let absorbed = log_state().absorb(&ctx.bno);
    log_lock().release();

    op_head_lock().acquire();
    let ctx_ptr = &mut ctx as *mut OpContext;
    pending().push(ctx_ptr);
    op_head_lock().release();

    op_num_lock().acquire();
    let reuse = OP_MAX_NUM_BLOCKS as i64 - (ctx.bno.len() as i64 - absorbed as i64);
    let before = remaining_log_num();
    set_remaining_log_num(before + reuse);
    if before < OP_MAX_NUM_BLOCKS as i64 && remaining_log_num() >= OP_MAX_NUM_BLOCKS as i64 {
        op_available().post();
    }
    set_running_op_num(running_op_num() - 1);

    if running_op_num() == 0 {
        commit();
    }
    op_num_lock().release();

    ctx.ok.wait_uninterruptible();
}

/// Group commit (§4.H, caller holds `op_num_lock`): write every logged
/// block to its log slot, fence, stamp the header (the commit point),
/// install each block to its home location, wake every op pending on
/// this window, then zero the header to mark "no recovery needed".
fn commit() {
    log_lock().acquire();
    let bnos = log_state().bno.clone();

    let mut header = LogHeader::empty();
    let mut held = Vec::with_capacity(bnos.len());
    for (i, &bno) in bnos.iter().enumerate() {
        let id = acquire(bno);
        let data = read(id);
        device_write(log_start() + 1 + i as u32, &data);
        header.block_no[i] = bno;
        held.push(id);
    }

    crate::arch::regs::sync();
    header.num_blocks = bnos.len() as u32;
    crate::arch::regs::sync();
    write_header(&header);
    debug!("log: committed {} block(s)", header.num_blocks);

    for &id in &held {
        sync(None, id);
        cache_lock().acquire();
        cache_list().get_mut(id).flags.remove(BlockFlags::PINNED);
        cache_list().get_mut(id).flags.insert(BlockFlags::VALID);
        cache_lock().release();
        release(id);
    }

    op_head_lock().acquire();
    for ptr in pending().drain(..) {
        unsafe { (*ptr).ok.post() };
    }
    op_head_lock().release();

    set_remaining_log_num(sblock().num_log_blocks.min(LOG_MAX_SIZE as u32) as i64);
    if op_available().count() <= 0 {
        op_available().post();
    }

    log_state().bno.clear();
    write_header(&LogHeader::empty());
    log_lock().release();
}

/// Allocate a fresh data block transactionally: set its bit in the
/// free-block bitmap (synced through `ctx`), then zero its contents with
/// a direct (unlogged) write -- the bitmap commit is what makes the
/// allocation durable, so the zero-fill does not also need to go through
/// the log. Scans the bitmap from `bm_bno` itself, per `original_source`'s
/// `cache_alloc` (SPEC_FULL §9 flags this scan origin as likely a latent
/// bug on multi-bitmap-block filesystems; reproduced rather than "fixed"
/// to a data-region offset).
pub fn alloc(ctx: &mut OpContext) -> u32 {
    let bm = acquire(bm_bno());
    let mut data = read(bm);
    let bit = bitmap::first_clear_bit(&data, bm_bno() as usize, sblock().num_blocks as usize)
        .expect("cache::alloc: filesystem full");
    bitmap::set(&mut data, bit);
    write(bm, &data);
    sync(Some(ctx), bm);
    release(bm);

    let b = acquire(bit as u32);
    write(b, &[0u8; BLOCK_SIZE]);
    sync(None, b);
    release(b);
    debug!("cache::alloc -> block {}", bit);
    bit as u32
}

/// Clear `block_no`'s bit in the free-block bitmap, synced through `ctx`.
pub fn free(ctx: &mut OpContext, block_no: u32) {
    let bm = acquire(bm_bno());
    let mut data = read(bm);
    bitmap::clear(&mut data, block_no as usize);
    write(bm, &data);
    sync(Some(ctx), bm);
    release(bm);
    debug!("cache::free <- block {}", block_no);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_dedups_within_a_commit_window() {
        let mut log = Log::new();
        let absorbed = log.absorb(&[10, 11]);
        assert_eq!(absorbed, 0);
        assert_eq!(log.bno, alloc::vec![10, 11]);

        // {11, 12}: 11 is already logged (absorbed), 12 is new.
        let absorbed = log.absorb(&[11, 12]);
        assert_eq!(absorbed, 1);
        assert_eq!(log.bno, alloc::vec![10, 11, 12]);
    }

    #[test]
    fn log_header_fits_in_one_block() {
        assert!(size_of::<LogHeader>() < BLOCK_SIZE);
    }

    fn filled(byte: u8) -> [u8; BLOCK_SIZE] {
        [byte; BLOCK_SIZE]
    }

    /// End-to-end over a mock device: two sequential transactions (the
    /// cache/log singleton has no reset hook between `#[test]`s sharing one
    /// process, so this is the one test in the tree that drives it -- see
    /// the grounding ledger), then a crash-injection replay, covering
    /// SPEC_FULL §8 scenarios 2 and 3. Transactions run one at a time
    /// (rather than genuinely overlapping across threads) since `end_op`
    /// blocks the caller until its commit is durable and nothing else here
    /// drives the scheduler that would let a second thread's `end_op`
    /// un-block the first; local/global absorption across truly concurrent
    /// ops is covered separately by `absorb_dedups_within_a_commit_window`.
    #[test]
    fn commits_install_home_locations_and_crash_replay_recovers() {
        crate::proc::process::init();

        let disk: &'static crate::fs::device::mock::RamDisk =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(
                crate::fs::device::mock::RamDisk::new(),
            ));
        let sblock = SuperBlock {
            log_start: 100,
            num_log_blocks: 50,
            bitmap_start: 200,
            num_blocks: 1000,
        };
        init(disk, sblock);
        assert_eq!(read_header().num_blocks, 0);

        // Transaction 1: write fresh blocks 10 and 11.
        let mut ctx1 = begin_op();
        let b10 = acquire(10);
        write(b10, &filled(0xAA));
        sync(Some(&mut ctx1), b10);
        release(b10);

        let b11 = acquire(11);
        write(b11, &filled(0xBB));
        sync(Some(&mut ctx1), b11);
        release(b11);
        end_op(ctx1);

        assert_eq!(disk.contents(10), filled(0xAA));
        assert_eq!(disk.contents(11), filled(0xBB));
        assert_eq!(read_header().num_blocks, 0, "commit zeroes the header");
        assert!(get_num_cached_blocks() >= 2);

        // Transaction 2: overwrite block 11 and write fresh block 12.
        // Exercises the cache-hit path in `acquire` (11 is already resident)
        // alongside the miss path (12).
        let mut ctx2 = begin_op();
        let b11_again = acquire(11);
        write(b11_again, &filled(0xCC));
        sync(Some(&mut ctx2), b11_again);
        release(b11_again);

        let b12 = acquire(12);
        write(b12, &filled(0xDD));
        sync(Some(&mut ctx2), b12);
        release(b12);
        end_op(ctx2);

        assert_eq!(disk.contents(10), filled(0xAA), "untouched by tx2");
        assert_eq!(disk.contents(11), filled(0xCC), "overwritten by tx2");
        assert_eq!(disk.contents(12), filled(0xDD));
        assert_eq!(read_header().num_blocks, 0);

        // Crash injection (§8 scenario 3): a header naming a committed-but-
        // not-yet-installed transaction over blocks 20/21, with their log
        // slots already durable but their home locations not yet written --
        // the exact state `commit` leaves on disk between writing the
        // header (the commit point) and finishing the install loop.
        let payload_e = filled(0xEE);
        let payload_f = filled(0xFF);
        device_write(log_start() + 1, &payload_e);
        device_write(log_start() + 2, &payload_f);
        let mut crash_header = LogHeader::empty();
        crash_header.num_blocks = 2;
        crash_header.block_no[0] = 20;
        crash_header.block_no[1] = 21;
        write_header(&crash_header);
        assert_eq!(disk.contents(20), filled(0), "not installed yet");

        replay();

        assert_eq!(disk.contents(20), payload_e);
        assert_eq!(disk.contents(21), payload_f);
        assert_eq!(read_header().num_blocks, 0, "replay re-zeroes the header");
    }
}

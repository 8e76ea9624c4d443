//! Central home for every tunable constant the kernel is built against.
//!
//! Mirrors the role xv6's `param.h` plays: every subsystem imports its knobs
//! from here instead of hard-coding them at the call site.

/// Maximum number of CPUs the scheduler arrays are sized for.
pub const NCPU: usize = 8;

/// Maximum number of live process records.
pub const NPROC: usize = 256;

/// Page size in bytes, shared by the page pool, the slab allocator and the
/// page directory.
pub const PGSIZE: usize = 4096;

/// Size in bytes of a kernel stack allocated for each process (one page).
pub const KSTACK_SIZE: usize = PGSIZE;

/// Number of PTEs per page-table level (512 entries of 8 bytes each).
pub const N_PTE_PER_TABLE: usize = 512;

/// Fixed size of a cached/on-disk block, in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Per-transaction cap on distinct blocks an op may touch before `end_op`.
pub const OP_MAX_NUM_BLOCKS: usize = 10;

/// Total number of on-disk log slots available to the write-ahead log.
pub const LOG_MAX_SIZE: usize = 200;

/// High-water mark: once the cache holds more than this many blocks,
/// `acquire` attempts to evict from the LRU tail before returning.
pub const EVICTION_THRESHOLD: usize = 128;

/// Number of fresh PID cells appended to a PID free list when it runs dry.
pub const PID_GROW_STEP: usize = 10;

/// Sentinel value for "not currently in user mode" in the trap-time field.
pub const TRAPTIME_NONE: i64 = -1;

/// Default device backing the root container's filesystem (mirrors xv6's
/// `ROOTDEV`).
pub const ROOTDEV: u32 = 1;

/// Preemption quantum: how long a process runs before `tick` forces a
/// reschedule.
pub const SCHED_QUANTUM_MS: u64 = 10;

//! Counting semaphore used throughout the scheduler and block cache:
//! `childexit`, the log's `op_available`, a block's per-block wait slot,
//! and an op context's completion signal are all one of these.
//!
//! The public surface (`wait`/`post`/`try_wait`/permit count) follows the
//! shape of the host-side `Semaphore` in `util/src/semaphore.rs`; the
//! blocking mechanism itself is the teacher's channel-based `sleep`/`wakeup`
//! rather than a spin/park loop, since this type blocks real kernel threads
//! rather than host OS threads.

use crate::sched::core;
use crate::sync::Spinlock;

pub struct Semaphore {
    lock: Spinlock,
    count: i64,
}

impl Semaphore {
    pub const fn new(initial: i64) -> Self {
        Semaphore {
            lock: Spinlock::init_lock("sem"),
            count: initial,
        }
    }

    /// Block (alertably) until a permit is available, then take it.
    /// Returns `false` if the calling process was killed while waiting.
    pub fn wait(&mut self) -> bool {
        self.lock.acquire();
        while self.count <= 0 {
            if !core::sleep_on(self as *const Self as usize, &mut self.lock, true) {
                self.lock.release();
                return false;
            }
        }
        self.count -= 1;
        self.lock.release();
        true
    }

    /// Block uninterruptibly (DEEPSLEEPING) until a permit is available.
    /// Used where partial kernel state must not be abandoned mid-operation
    /// (log commit, cache fetch in flight).
    pub fn wait_uninterruptible(&mut self) {
        self.lock.acquire();
        while self.count <= 0 {
            core::sleep_on(self as *const Self as usize, &mut self.lock, false);
        }
        self.count -= 1;
        self.lock.release();
    }

    pub fn try_wait(&mut self) -> bool {
        self.lock.acquire();
        let ok = self.count > 0;
        if ok {
            self.count -= 1;
        }
        self.lock.release();
        ok
    }

    /// Release a permit and wake one waiter.
    pub fn post(&mut self) {
        self.lock.acquire();
        self.count += 1;
        self.lock.release();
        core::wake(self as *const Self as usize);
    }

    pub fn count(&mut self) -> i64 {
        self.lock.acquire();
        let c = self.count;
        self.lock.release();
        c
    }
}

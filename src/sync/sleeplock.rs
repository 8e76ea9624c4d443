//! Long-term lock for code paths that may block (a cached block's per-block
//! mutex). Adapted directly from the teacher's `Sleeplock`.

use crate::sched::core;
use crate::sync::Spinlock;

pub struct Sleeplock {
    locked: bool,
    lk: Spinlock,
    name: &'static str,
    holder_pid: u32,
}

impl Sleeplock {
    pub const fn init_lock(name: &'static str) -> Self {
        Sleeplock {
            locked: false,
            lk: Spinlock::init_lock("sleep lock"),
            name,
            holder_pid: 0,
        }
    }

    pub fn acquire_sleep(&mut self) {
        self.lk.acquire();
        while self.locked {
            core::sleep_on(self as *const Self as usize, &mut self.lk, false);
        }
        self.locked = true;
        self.holder_pid = core::this_pid();
        self.lk.release();
    }

    pub fn release_sleep(&mut self) {
        self.lk.acquire();
        self.locked = false;
        self.holder_pid = 0;
        self.lk.release();
        core::wake(self as *const Self as usize);
    }

    pub fn holding_sleep(&mut self) -> bool {
        self.lk.acquire();
        let r = self.locked && self.holder_pid == core::this_pid();
        self.lk.release();
        r
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

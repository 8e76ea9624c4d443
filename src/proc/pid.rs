//! PID allocator, one instance per scope (global, or embedded per
//! container for container-local ids). Grounded in
//! `original_source/src/kernel/pid.c`: a list of cells grown lazily ten at
//! a time, linear-scanned for a free one.

use alloc::vec::Vec;

use crate::param::PID_GROW_STEP;

#[derive(Clone, Copy)]
struct PidCell {
    pid: u32,
    used: bool,
}

pub struct PidAllocator {
    cells: Vec<PidCell>,
    next_raw: u32,
}

impl PidAllocator {
    pub const fn new() -> Self {
        PidAllocator {
            cells: Vec::new(),
            next_raw: 1,
        }
    }

    fn grow(&mut self) {
        for _ in 0..PID_GROW_STEP {
            self.cells.push(PidCell {
                pid: self.next_raw,
                used: false,
            });
            self.next_raw += 1;
        }
    }

    /// Allocate the lowest-numbered free pid in this scope, growing the
    /// list by [`PID_GROW_STEP`] if every existing cell is taken.
    pub fn get(&mut self) -> u32 {
        loop {
            if let Some(cell) = self.cells.iter_mut().find(|c| !c.used) {
                cell.used = true;
                return cell.pid;
            }
            self.grow();
        }
    }

    /// Release a pid back to this scope. No-op if not found (mirrors the
    /// original's linear scan-and-clear, which is also silent on a miss).
    pub fn release(&mut self, pid: u32) {
        if let Some(idx) = self.cells.iter().position(|c| c.pid == pid) {
            self.cells[idx].used = false;
            // Move the freed cell to the front so future scans find it
            // fast, matching the original's detach-and-reinsert-at-head.
            let cell = self.cells.remove(idx);
            self.cells.insert(0, cell);
        }
    }

    /// Reclaim every unused cell. Only valid for a scope that is being torn
    /// down (a container being destroyed); never called on the global
    /// scope.
    pub fn compact(&mut self) {
        self.cells.retain(|c| c.used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_and_grows() {
        let mut a = PidAllocator::new();
        let first = a.get();
        for _ in 1..PID_GROW_STEP {
            a.get();
        }
        // exactly PID_GROW_STEP cells exist and are all used; next alloc
        // must grow the list rather than panic or reuse.
        let grown = a.get();
        assert_ne!(first, grown);
    }

    #[test]
    fn release_then_reacquire_reuses_slot() {
        let mut a = PidAllocator::new();
        let p1 = a.get();
        let p2 = a.get();
        a.release(p1);
        let p3 = a.get();
        assert_eq!(p1, p3);
        assert_ne!(p2, p3);
    }

    #[test]
    fn compact_drops_only_unused_cells() {
        let mut a = PidAllocator::new();
        let keep = a.get();
        let drop_me = a.get();
        a.release(drop_me);
        a.compact();
        // the kept pid must still be reachable as used; a fresh get() must
        // not hand out the same number again.
        let next = a.get();
        assert_ne!(next, keep);
    }
}

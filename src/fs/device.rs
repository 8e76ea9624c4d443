//! Block device boundary (§6 EXTERNAL INTERFACES) and the on-disk
//! superblock layout G+H read from it. A boundary-only surface: this
//! kernel's scope stops at handing fixed-size blocks to/from something
//! that implements [`BlockDevice`] -- no virtio/driver plumbing lives
//! here (see Non-goals).

use crate::param::BLOCK_SIZE;

/// Synchronous block I/O. Implementations are expected to treat any
/// failure as fatal (panic), matching §7: "block device I/O error" is
/// listed among the unrecoverable conditions.
pub trait BlockDevice {
    fn read(&self, block_no: u32, buf: &mut [u8; BLOCK_SIZE]);
    fn write(&self, block_no: u32, buf: &[u8; BLOCK_SIZE]);
}

/// Layout constants for the filesystem this block cache backs. Grounded in
/// `original_source/src/fs/cache.c`'s `sblock` fields.
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    /// First block of the write-ahead log (the header block itself).
    pub log_start: u32,
    /// Number of blocks reserved for the log, header included.
    pub num_log_blocks: u32,
    /// Block number of the (first) free-block bitmap.
    pub bitmap_start: u32,
    /// Total number of blocks in the filesystem, the upper bound `alloc`
    /// scans up to.
    pub num_blocks: u32,
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use alloc::collections::BTreeMap;
    use core::cell::RefCell;

    /// In-memory stand-in for a disk, keyed by block number, used by the
    /// host-side cache/log tests. Unwritten blocks read as all-zero.
    pub struct RamDisk {
        blocks: RefCell<BTreeMap<u32, [u8; BLOCK_SIZE]>>,
    }

    impl RamDisk {
        pub fn new() -> Self {
            RamDisk {
                blocks: RefCell::new(BTreeMap::new()),
            }
        }

        pub fn contents(&self, block_no: u32) -> [u8; BLOCK_SIZE] {
            *self
                .blocks
                .borrow()
                .get(&block_no)
                .unwrap_or(&[0u8; BLOCK_SIZE])
        }
    }

    impl BlockDevice for RamDisk {
        fn read(&self, block_no: u32, buf: &mut [u8; BLOCK_SIZE]) {
            *buf = self.contents(block_no);
        }

        fn write(&self, block_no: u32, buf: &[u8; BLOCK_SIZE]) {
            self.blocks.borrow_mut().insert(block_no, *buf);
        }
    }
}

//! Block cache and write-ahead log: a [`device`]-backed, LRU-indexed
//! [`block`] cache (component G) layered with the transactional log in
//! [`cache`] (component H). [`bitmap`] is the free-block bitmap logic
//! `cache`'s `alloc`/`free` build on. Grounded in
//! `original_source/src/fs/cache.c`.

pub mod bitmap;
pub mod block;
pub mod cache;
pub mod device;

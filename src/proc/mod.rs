//! Process and container bookkeeping: the global arenas, pid allocation,
//! and lifecycle transitions. Grounded in `original_source/src/kernel/
//! {proc,container,pid}.c`.

pub mod container;
pub mod lifecycle;
pub mod pid;
pub mod process;

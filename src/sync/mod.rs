pub mod semaphore;
pub mod sleeplock;
pub mod spinlock;

pub use semaphore::Semaphore;
pub use sleeplock::Sleeplock;
pub use spinlock::{pop_off, push_off, Spinlock};

//! Synchronization primitives (spec.md component D)
//!
//! Three layers, each grounded on the previous: an IF-save spinlock for
//! the shortest critical sections (bitmaps, free lists), a mutex built on
//! top of the spinlock plus a FIFO wait queue for longer held sections
//! that may need to sleep, and a condition variable for the classic
//! wait/notify pattern used by `wait`/reap and PTS line discipline reads.

pub mod condvar;
pub mod mutex;
pub mod spinlock;

pub use condvar::CondVar;
pub use mutex::{Mutex, MutexGuard};
pub use spinlock::Spinlock;

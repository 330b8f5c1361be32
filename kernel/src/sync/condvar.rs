//! Condition variable
//!
//! Layered on [`super::mutex::Mutex`] the usual way: `wait` atomically
//! enqueues the caller and drops the mutex (re-acquiring it before
//! returning), `notify_one`/`notify_all` wake queued threads without
//! touching the mutex at all. Used by `wait`/reap (a parent blocks on its
//! child-exit condvar) and by the PTS line discipline (a reader blocks
//! until a full line is available).

use alloc::collections::VecDeque;

use crate::arch::x86::irq;
use crate::sched::ThreadId;
use crate::sync::{Mutex, MutexGuard, Spinlock};

pub struct CondVar {
    waiters: Spinlock<VecDeque<ThreadId>>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self { waiters: Spinlock::new(VecDeque::new()) }
    }

    /// Atomically release `guard`'s mutex and block until notified, then
    /// reacquire it before returning.
    pub fn wait<'a, T>(&self, mutex: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let me = crate::sched::current_thread_id();
        // Same reasoning as `Mutex::lock`: the enqueue, the mutex
        // release (`drop(guard)`), and going off-CPU all have to happen
        // as one atomic step or a signaler can wake `me` while it's
        // still technically runnable and double-queue it.
        let was_if = irq::save_clear_if();
        self.waiters.lock().push_back(me);
        crate::sched::mark_suspended(me);
        drop(guard);
        crate::sched::block_current();
        irq::restore_if(was_if);
        mutex.lock()
    }

    pub fn notify_one(&self) {
        if let Some(tid) = self.waiters.lock().pop_front() {
            crate::sched::wake_thread(tid);
        }
    }

    pub fn notify_all(&self) {
        let mut waiters = self.waiters.lock();
        while let Some(tid) = waiters.pop_front() {
            crate::sched::wake_thread(tid);
        }
    }
}

extern crate alloc;

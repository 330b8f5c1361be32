//! Blocking mutex
//!
//! Built the way spec.md §5 describes: a spinlock guarding a small amount
//! of state (an owner flag and a FIFO queue of waiting thread ids), plus
//! an atomic per-thread "suspended" flag the scheduler checks before
//! actually taking a thread off the CPU, so a wakeup racing a suspend
//! never gets lost. Waiting threads park on the ready-queue's sleep side
//! rather than busy-spinning.

use alloc::collections::VecDeque;

use crate::arch::x86::irq;
use crate::sched::ThreadId;
use crate::sync::Spinlock;

struct MutexState {
    held: bool,
    waiters: VecDeque<ThreadId>,
}

pub struct Mutex<T> {
    state: Spinlock<MutexState>,
    inner: spin::Mutex<T>,
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    inner: spin::MutexGuard<'a, T>,
}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Self {
            state: Spinlock::new(MutexState { held: false, waiters: VecDeque::new() }),
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        loop {
            // `was_if` has to span the enqueue, the drop of `st`, and
            // `block_current`'s own mark-Blocked-then-switch: if
            // interrupts reopen the moment `st` is dropped, a wakeup can
            // land before this thread has actually left the CPU and
            // queue it a second time.
            let was_if = irq::save_clear_if();
            let mut st = self.state.lock();
            if !st.held {
                st.held = true;
                drop(st);
                irq::restore_if(was_if);
                break;
            }
            let me = crate::sched::current_thread_id();
            st.waiters.push_back(me);
            crate::sched::mark_suspended(me);
            drop(st);
            crate::sched::block_current();
            irq::restore_if(was_if);
        }
        MutexGuard { mutex: self, inner: self.inner.lock() }
    }

    fn unlock(&self) {
        let mut st = self.state.lock();
        st.held = false;
        if let Some(next) = st.waiters.pop_front() {
            crate::sched::wake_thread(next);
        }
    }
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

extern crate alloc;

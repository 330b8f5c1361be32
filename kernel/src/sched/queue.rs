//! Ready queue and sleep heap
//!
//! Ready queue: conceptually the intrusive circular doubly-linked list
//! spec.md §4.E describes; implemented as a `VecDeque<ThreadId>` behind
//! the `ready_lock` spinlock; the design note in spec.md §9 about
//! arena-plus-index access is satisfied by `ThreadId` being that index
//! into [`crate::process::table`]'s thread table. Sleep heap: a min-heap
//! keyed by wake-tick, drained by the timer handler each tick.

use alloc::collections::{BinaryHeap, VecDeque};
use core::cmp::Ordering;

use crate::sync::Spinlock;

use super::task::ThreadId;

static READY: Spinlock<VecDeque<ThreadId>> = Spinlock::new(VecDeque::new());

/// Enqueue at the tail: timer-wake and I/O-complete wakeups (spec.md §5
/// ordering guarantee).
pub fn push_back(tid: ThreadId) {
    READY.lock().push_back(tid);
}

/// Enqueue at the head: `cv_signal`/mutex-release wakeups, to minimize
/// convoy effects (spec.md §5).
pub fn push_front(tid: ThreadId) {
    READY.lock().push_front(tid);
}

pub fn pop_front() -> Option<ThreadId> {
    READY.lock().pop_front()
}

pub fn is_empty() -> bool {
    READY.lock().is_empty()
}

#[derive(Eq, PartialEq)]
struct SleepEntry {
    wake_tick: u64,
    tid: ThreadId,
}

impl Ord for SleepEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest tick.
        other.wake_tick.cmp(&self.wake_tick)
    }
}

impl PartialOrd for SleepEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

static SLEEPERS: Spinlock<BinaryHeap<SleepEntry>> = Spinlock::new(BinaryHeap::new());

pub fn sleep_until(tid: ThreadId, wake_tick: u64) {
    SLEEPERS.lock().push(SleepEntry { wake_tick, tid });
}

/// Pop every sleeper whose wake-tick has arrived, returning their
/// `ThreadId`s in wake order. Called once per timer tick.
pub fn drain_expired(now: u64) -> alloc::vec::Vec<ThreadId> {
    let mut sleepers = SLEEPERS.lock();
    let mut woken = alloc::vec::Vec::new();
    while let Some(top) = sleepers.peek() {
        if top.wake_tick > now {
            break;
        }
        woken.push(sleepers.pop().unwrap().tid);
    }
    woken
}

extern crate alloc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_heap_wakes_in_tick_order() {
        let heap = Spinlock::new(BinaryHeap::<SleepEntry>::new());
        {
            let mut h = heap.lock();
            h.push(SleepEntry { wake_tick: 40, tid: 1 });
            h.push(SleepEntry { wake_tick: 10, tid: 2 });
            h.push(SleepEntry { wake_tick: 20, tid: 3 });
        }
        let mut order = alloc::vec::Vec::new();
        while let Some(e) = heap.lock().pop() {
            order.push(e.tid);
        }
        assert_eq!(order, alloc::vec![2, 3, 1]);
    }

    #[test]
    fn ready_queue_is_fifo_from_the_back() {
        push_back(5);
        push_back(6);
        assert_eq!(pop_front(), Some(5));
        assert_eq!(pop_front(), Some(6));
    }
}

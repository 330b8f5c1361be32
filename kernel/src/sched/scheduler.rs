//! Context-switch orchestration (spec.md §4.E)
//!
//! `schedule()` is the only place that calls `switch_context`. It always
//! runs with interrupts disabled and with no lock held across the switch
//! itself — `process::table::task_ptr` hands back a raw, stable pointer
//! to each `Task` precisely so the table's `threads_lock` can be dropped
//! before the asm jump, matching the lock-order rule in spec.md §5
//! (`threads_lock` sits above `tid.status_lock`, which sits above
//! `ready_lock`: none of the three may still be held when control
//! actually leaves this CPU).

use crate::arch::x86::context::{switch_context, Context};
use crate::arch::x86::irq;
use crate::process::table;

use super::queue;
use super::smp;
use super::task::{ThreadId, ThreadStatus};

/// Pick the next ready thread, or this CPU's idle thread if the ready
/// queue is empty.
fn pick_next() -> ThreadId {
    queue::pop_front().unwrap_or_else(smp::idle)
}

/// Switch away from the current thread. If `requeue_current` is set and
/// the current thread isn't the idle thread, it's pushed to the ready
/// queue's tail first (voluntary yield and timer preemption both do
/// this; a thread blocking on a mutex/cv does not — its waiter-queue
/// entry is what will bring it back).
///
/// Must be called with interrupts disabled. Returns once this thread is
/// switched back in.
pub fn schedule(requeue_current: bool) {
    let was_if = irq::save_clear_if();

    let current = smp::current();
    let next = pick_next();

    if next == current {
        irq::restore_if(was_if);
        return;
    }

    if requeue_current && current != smp::idle() {
        mark_status(current, ThreadStatus::Ready);
        queue::push_back(current);
    }

    let from_ptr = table::task_ptr(current);
    let to_ptr = table::task_ptr(next).expect("scheduling into a reaped thread");

    mark_status(next, ThreadStatus::Running);
    smp::set_current(next);
    switch_address_space(next);

    // SAFETY: both pointers come from live entries in the thread table;
    // `to` was just marked Running by this CPU and isn't running
    // anywhere else (single-CPU builds trivially, SMP builds by virtue
    // of only ever picking threads off the shared ready queue once).
    unsafe {
        match from_ptr {
            Some(from) => switch_context(
                core::ptr::addr_of_mut!((*from.as_ptr()).context),
                core::ptr::addr_of!((*to_ptr.as_ptr()).context),
            ),
            None => {
                // No `from` (the very first switch off the boot stack):
                // jump straight into `to`, discarding the boot context.
                let mut discard = Context::default();
                switch_context(&mut discard, core::ptr::addr_of!((*to_ptr.as_ptr()).context));
            }
        }
    }

    irq::restore_if(was_if);
}

/// Load `tid`'s owning process's page directory if it isn't already the
/// one loaded. The idle thread belongs to no process and keeps whatever
/// was loaded (the kernel's own low memory is globally mapped anyway).
fn switch_address_space(tid: ThreadId) {
    let Ok(pid) = table::with_task(tid, |t| t.pid) else { return };
    let Ok(cr3) = crate::process::table::with_process(pid, |p| p.cr3) else { return };
    let current = crate::arch::x86::read_cr3();
    if current != cr3.0 {
        // SAFETY: `cr3` is the live page directory of `tid`'s process,
        // built by `process::lifecycle` and never freed while any of
        // its threads are live.
        unsafe { crate::arch::x86::load_cr3(cr3.0) };
    }
}

fn mark_status(tid: ThreadId, status: ThreadStatus) {
    let _ = table::with_task(tid, |task| {
        *task.status.lock() = status;
    });
}

/// Voluntary `yield` syscall: give up the CPU, stay ready.
pub fn yield_now() {
    schedule(true);
}

/// Block the calling thread (mutex wait, cv wait, `deschedule`): mark it
/// not-ready and switch away without requeuing it. Whoever unblocks it
/// later (`wake_thread`) is responsible for putting it back on the ready
/// queue.
pub fn block_current() {
    let current = smp::current();
    mark_status(current, ThreadStatus::Blocked);
    schedule(false);
}

/// Called from the timer ISR (already running with interrupts disabled,
/// on this thread's kernel stack): wake any expired sleepers, then
/// preempt the current thread back onto the ready queue's tail.
pub fn on_timer_tick(now: u64) {
    for tid in queue::drain_expired(now) {
        wake_thread(tid);
    }
    schedule(true);
}

/// Move a blocked/sleeping thread back onto the ready queue. Pushes to
/// the front (spec.md §5: cv-signal and mutex-release wakeups go to the
/// front to cut convoy effects); timer wakeups go through this too and
/// inherit the same placement, which only matters relative to other
/// already-ready threads and not to fairness against the sleeper itself.
pub fn wake_thread(tid: ThreadId) {
    mark_status(tid, ThreadStatus::Ready);
    queue::push_front(tid);
}

/// Leave the current thread for good: the caller has already removed
/// its `Task` from the thread table, so the next `schedule()` finds no
/// context to save and discards this CPU's stack outright rather than
/// switching back into it.
pub fn exit_current() -> ! {
    let was_if = irq::save_clear_if();
    let next = pick_next();
    mark_status(next, ThreadStatus::Running);
    smp::set_current(next);
    switch_address_space(next);
    let to_ptr = table::task_ptr(next).expect("scheduling into a reaped thread");
    let mut discard = Context::default();
    // SAFETY: this thread's `Task` is already gone from the table, so
    // there is nothing left to save into `discard` and nothing will
    // ever switch back into it.
    unsafe {
        switch_context(&mut discard, core::ptr::addr_of!((*to_ptr.as_ptr()).context));
    }
    irq::restore_if(was_if);
    unreachable!("switch_context returned into a reaped thread")
}

/// `DESCHEDULE` syscall: block the calling thread with a status distinct
/// from a mutex/cv wait, so only an explicit `MAKE_RUNNABLE` on its tid
/// (not a stray `wake_thread`) brings it back.
pub fn deschedule_current() {
    let current = smp::current();
    mark_status(current, ThreadStatus::Descheduled);
    schedule(false);
}

/// `MAKE_RUNNABLE` syscall: move a descheduled thread back onto the ready
/// queue. Fails if `tid` isn't currently descheduled (already running,
/// blocked some other way, or never existed).
pub fn make_runnable(tid: ThreadId) -> Result<(), crate::error::KernelError> {
    let is_descheduled = table::with_task(tid, |task| *task.status.lock() == ThreadStatus::Descheduled)?;
    if !is_descheduled {
        return Err(crate::error::SyscallFailure::InvalidArgument.into());
    }
    wake_thread(tid);
    Ok(())
}

/// Put the current thread to sleep until `wake_tick`, then block it. The
/// `SLEEP` syscall handler calls this directly.
pub fn sleep_until(wake_tick: u64) {
    let current = smp::current();
    let _ = table::with_task_mut(current, |task| {
        task.wake_tick = wake_tick;
    });
    mark_status(current, ThreadStatus::Sleeping);
    queue::sleep_until(current, wake_tick);
    schedule(false);
}

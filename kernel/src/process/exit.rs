//! Process and thread exit (component F's `vanish`/`task_vanish`)
//!
//! A thread leaving via `vanish`, `task_vanish`, or a fatal fault always
//! funnels through [`task_vanish_current`]. The last thread to leave a
//! process releases its memory regions, reparents live children to
//! init, wakes the parent's `wait`, and frees the page directory; every
//! other thread just drops off the live-thread list.

extern crate alloc;

use crate::mm::paging::PhysicalAddress;
use crate::process::memory;
use crate::process::pcb::ProcessId;
use crate::process::table;
use crate::sched::{ThreadId, ThreadStatus};

/// PID reparented orphans are handed to (spec.md §4.F "reparenting").
pub const INIT_PID: ProcessId = 1;

/// Terminate the calling thread (`VANISH`, or a fatal fault/`swexn`
/// failure with `status` as the classifying exit code). Never returns.
pub fn task_vanish_current(status: i32) -> ! {
    let tid = crate::sched::current_tid();
    let pid = table::with_task(tid, |t| t.pid).unwrap_or(0);
    vanish_thread(pid, tid, status);
    crate::sched::exit_current_thread();
}

/// `TASK_VANISH` syscall: mark every other thread of the calling process
/// for exit and let each one tear itself down the next time it crosses
/// back into the kernel (the next syscall, fault, or IRQ), rather than
/// reaping their `Task`s out from under a `ThreadId` that might still be
/// sitting in the ready queue or sleep heap. A sibling that's merely
/// `Ready`/`Running` will see `pending_exit` on its own at that boundary;
/// one parked `Sleeping`/`Descheduled` has to be forced back onto the
/// ready queue first or it would never get there.
pub fn task_vanish_process(status: i32) -> ! {
    let tid = crate::sched::current_tid();
    let pid = table::with_task(tid, |t| t.pid).unwrap_or(0);
    let siblings = table::with_process(pid, |p| p.live_threads.lock().clone()).unwrap_or_default();
    for sibling in siblings {
        if sibling == tid {
            continue;
        }
        let needs_wake = table::with_task_mut(sibling, |task| {
            task.pending_exit = true;
            matches!(*task.status.lock(), ThreadStatus::Descheduled | ThreadStatus::Sleeping)
        })
        .unwrap_or(false);
        if needs_wake {
            crate::sched::wake_thread(sibling);
        }
    }
    vanish_thread(pid, tid, status);
    crate::sched::exit_current_thread();
}

fn vanish_thread(pid: ProcessId, tid: ThreadId, status: i32) {
    table::remove_task(tid);

    let is_last = table::with_process(pid, |process| {
        let mut threads = process.live_threads.lock();
        threads.retain(|&t| t != tid);
        threads.is_empty()
    })
    .unwrap_or(true);

    if is_last {
        teardown_process(pid, status);
    }
}

/// Release a process's address space, reparent its children, and signal
/// whoever is waiting on it. Runs exactly once, when the process's last
/// thread leaves.
fn teardown_process(pid: ProcessId, status: i32) {
    let parent = table::with_process(pid, |process| {
        let mut regions = process.regions.lock();
        for region in regions.drain(..) {
            let _ = memory::release_region(&region);
        }
        process.parent
    })
    .unwrap_or(None);

    if let Some(parent_pid) = parent {
        let _ = table::with_process(parent_pid, |parent_process| {
            let mut wait = parent_process.wait.lock();
            wait.live_children.retain(|&c| c != pid);
            wait.dead_children.push((pid, status));
            parent_process.wait_cv.notify_one();
        });
    }

    reparent_children(pid, parent.unwrap_or(INIT_PID));

    if let Ok(cr3) = table::with_process(pid, |p| p.cr3) {
        crate::mm::paging::free_page_directory(cr3);
    }

    table::remove_process(pid);
}

/// Orphaned children are reparented to init (or, failing that, to
/// whatever `new_parent` is, matching the teardown's own parent if init
/// itself is what's vanishing).
fn reparent_children(pid: ProcessId, new_parent: ProcessId) {
    for child in table::children_of(pid) {
        let _ = table::with_process(child, |_| {});
        let _ = table::reparent(child, new_parent);
        let _ = table::with_process(new_parent, |np| {
            np.wait.lock().live_children.push(child);
        });
    }
}

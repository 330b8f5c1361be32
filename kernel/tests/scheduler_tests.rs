//! On-target tests for the ready queue, sleep heap, and the
//! non-blocking halves of thread wake/deschedule bookkeeping (component
//! E). Tests never call `sched::run`/`block_current`/`deschedule_current`
//! themselves: this binary has no second thread for anything to switch
//! back into, so only the queue and status-transition primitives are
//! exercised directly.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use alloc::vec::Vec;

use veridian_kernel::error::KernelError;
use veridian_kernel::process::table;
use veridian_kernel::sched::task::{Task, ThreadStatus};
use veridian_kernel::sched::{self, queue};
use veridian_kernel::{kernel_assert, kernel_assert_eq};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::mm::init(64 * 1024 * 1024);
    veridian_kernel::mm::heap::init();
    table::init();
    test_main();
    loop {
        veridian_kernel::arch::x86::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_framework::test_panic_handler(info)
}

fn spawn_idle_thread(pid: u32) -> u32 {
    let tid = table::alloc_tid();
    let task = Task::new_user_thread(tid, pid, 0x1000, 0x2000, 0);
    table::insert_task(task);
    tid
}

/// Timer-tick wakeups enqueue at the tail, so two threads woken in the
/// same tick come off in the order they were woken.
#[test_case]
fn ready_queue_wakes_come_off_in_push_order() -> Result<(), KernelError> {
    let a = table::alloc_tid();
    let b = table::alloc_tid();
    queue::push_back(a);
    queue::push_back(b);
    kernel_assert_eq!(queue::pop_front(), Some(a));
    kernel_assert_eq!(queue::pop_front(), Some(b));
    kernel_assert!(queue::is_empty());
    Ok(())
}

/// Threads A/B/C sleep for 30/10/20 ticks; the timer drains them in
/// wake-tick order (B, C, A), not enqueue order.
#[test_case]
fn sleep_heap_drains_in_wake_tick_order() -> Result<(), KernelError> {
    let a = table::alloc_tid();
    let b = table::alloc_tid();
    let c = table::alloc_tid();

    queue::sleep_until(a, 100 + 30);
    queue::sleep_until(b, 100 + 10);
    queue::sleep_until(c, 100 + 20);

    let woken: Vec<u32> = queue::drain_expired(100 + 30);
    kernel_assert_eq!(woken, alloc::vec![b, c, a]);
    Ok(())
}

/// Nothing wakes before its tick arrives.
#[test_case]
fn sleep_heap_drain_respects_the_deadline() -> Result<(), KernelError> {
    let a = table::alloc_tid();
    queue::sleep_until(a, 500);
    kernel_assert!(queue::drain_expired(499).is_empty());
    let woken = queue::drain_expired(500);
    kernel_assert_eq!(woken, alloc::vec![a]);
    Ok(())
}

/// Waking a thread marks it `Ready` and puts it on the ready queue.
#[test_case]
fn wake_thread_marks_ready_and_enqueues() -> Result<(), KernelError> {
    let pid = table::alloc_pid();
    let tid = spawn_idle_thread(pid);
    table::with_task_mut(tid, |t| *t.status.lock() = ThreadStatus::Blocked)?;

    sched::wake_thread(tid);

    let status = table::with_task(tid, |t| *t.status.lock())?;
    kernel_assert_eq!(status, ThreadStatus::Ready);
    kernel_assert_eq!(queue::pop_front(), Some(tid));
    Ok(())
}

/// `make_runnable` only succeeds on a descheduled thread, and leaves a
/// thread in any other state untouched (spec.md's `MAKE_RUNNABLE`
/// restriction).
#[test_case]
fn make_runnable_rejects_a_non_descheduled_thread() -> Result<(), KernelError> {
    let pid = table::alloc_pid();
    let tid = spawn_idle_thread(pid);
    table::with_task_mut(tid, |t| *t.status.lock() = ThreadStatus::Ready)?;

    let result = sched::make_runnable(tid);
    kernel_assert!(result.is_err());
    Ok(())
}

#[test_case]
fn make_runnable_wakes_a_descheduled_thread() -> Result<(), KernelError> {
    let pid = table::alloc_pid();
    let tid = spawn_idle_thread(pid);
    table::with_task_mut(tid, |t| *t.status.lock() = ThreadStatus::Descheduled)?;

    sched::make_runnable(tid)?;

    let status = table::with_task(tid, |t| *t.status.lock())?;
    kernel_assert_eq!(status, ThreadStatus::Ready);
    kernel_assert_eq!(queue::pop_front(), Some(tid));
    Ok(())
}

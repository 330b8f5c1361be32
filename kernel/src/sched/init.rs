//! Scheduler bootstrap: one idle thread per CPU.
//!
//! The idle thread is pid0's only thread on each CPU — it never appears
//! on the ready queue (`schedule()` falls back to it only when the
//! queue is empty) and simply halts waiting for the next interrupt.

use crate::process::table;

use super::smp;
use super::task::Task;

extern "C" fn idle_loop() -> ! {
    loop {
        crate::arch::x86::hlt();
    }
}

/// Create and register the idle thread for every configured CPU. Must
/// run after [`crate::process::init`] has created pid0 to own them.
pub fn init() {
    for cpu in 0..smp::num_cpus() {
        let tid = table::alloc_tid();
        let task = Task::new_kernel_thread(tid, 0, idle_loop, 0);
        table::insert_task(task);
        let _ = cpu;
    }
    // Single-CPU builds: there's exactly one idle thread, tid 1.
    smp::set_idle(1);
    smp::set_current(1);
    log::info!(target: "sched", "scheduler initialized, idle thread {}", 1);
}

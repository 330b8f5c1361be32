//! Preemptive scheduler (spec.md component E)
//!
//! Ready queue + sleep heap in [`queue`], per-CPU current/idle slots in
//! [`smp`], the TCB in [`task`], and the actual switch orchestration in
//! [`scheduler`]. This module is the public surface everything else
//! (syscalls, sync primitives, the timer ISR) calls into.

pub mod init;
pub mod queue;
pub mod scheduler;
pub mod smp;
pub mod task;
pub mod task_ptr;

pub use task::{ThreadId, ThreadStatus};

/// Bring up the idle thread(s). Called once from `kernel_main`, after
/// `process::init()` has created pid0 to own them.
pub fn init() {
    init::init();
}

/// Enter the scheduler proper: the boot thread becomes CPU 0's first
/// "from" context and never runs again as itself (it's discarded the
/// first time `schedule()` picks a real thread).
pub fn run() -> ! {
    loop {
        scheduler::schedule(false);
        crate::arch::x86::hlt();
    }
}

pub fn current_thread_id() -> ThreadId {
    smp::current()
}

/// Called from the timer ISR once per tick.
pub fn on_timer_tick() {
    scheduler::on_timer_tick(crate::arch::x86::timer::current_tick());
}

/// Mark `tid` blocked without switching away from it yet (used by
/// `sync::Mutex`/`sync::CondVar` right before they call
/// [`block_current`], so the two calls always happen back to back on
/// the calling thread itself).
pub fn mark_suspended(tid: ThreadId) {
    let _ = crate::process::table::with_task(tid, |task| {
        *task.status.lock() = ThreadStatus::Blocked;
    });
}

/// Give up the CPU without requeuing; returns once [`wake_thread`] is
/// called on this thread's id from some other thread.
pub fn block_current() {
    scheduler::block_current();
}

/// Move a blocked thread back onto the ready queue.
pub fn wake_thread(tid: ThreadId) {
    scheduler::wake_thread(tid);
}

/// Voluntary `YIELD` syscall.
pub fn yield_now() {
    scheduler::yield_now();
}

/// `SLEEP` syscall: block the caller until `ticks` timer ticks elapse.
pub fn sleep_ticks(ticks: u64) {
    let wake = crate::arch::x86::timer::current_tick() + ticks;
    scheduler::sleep_until(wake);
}

/// `GETTID` syscall.
pub fn current_tid() -> ThreadId {
    smp::current()
}

/// `DESCHEDULE` syscall.
pub fn deschedule_current() {
    scheduler::deschedule_current();
}

/// `MAKE_RUNNABLE` syscall.
pub fn make_runnable(tid: ThreadId) -> Result<(), crate::error::KernelError> {
    scheduler::make_runnable(tid)
}

/// Current thread's owning process id.
pub fn current_pid() -> task::ProcessId {
    crate::process::table::with_task(smp::current(), |t| t.pid).unwrap_or(0)
}

/// Leave the current thread for good (`vanish`/`task_vanish`/a fatal
/// fault). The caller must have already removed this thread's `Task`
/// from [`crate::process::table`].
pub fn exit_current_thread() -> ! {
    scheduler::exit_current()
}

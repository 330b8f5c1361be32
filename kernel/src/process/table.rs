//! Global process table and thread table
//!
//! Both tables are a `BTreeMap` behind a single global lock. The thread
//! table's lock is `threads_lock`; its lock-ordering rule ("`threads_lock`
//! above every process-level mutex, above `tid.status_lock`, above
//! `ready_lock`") means callers must never call back into `sched`/`mm`
//! while holding a guard returned from here — `with_task`/`with_process`
//! copy what they need out and drop the guard before doing anything that
//! might itself want `threads_lock`.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{KernelError, SyscallFailure};
use crate::sched::task::{Task, ThreadId};
use crate::sync::Mutex;

use super::pcb::{Process, ProcessId};

static PROCESSES: Mutex<BTreeMap<ProcessId, Box<Process>>> = Mutex::new(BTreeMap::new());
static THREADS: Mutex<BTreeMap<ThreadId, Box<Task>>> = Mutex::new(BTreeMap::new());

static NEXT_PID: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(1);
static NEXT_TID: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(1);

pub fn alloc_pid() -> ProcessId {
    NEXT_PID.fetch_add(1, core::sync::atomic::Ordering::Relaxed)
}

pub fn alloc_tid() -> ThreadId {
    NEXT_TID.fetch_add(1, core::sync::atomic::Ordering::Relaxed)
}

pub fn insert_process(process: Process) -> ProcessId {
    let pid = process.pid;
    PROCESSES.lock().insert(pid, Box::new(process));
    pid
}

pub fn remove_process(pid: ProcessId) -> Option<Box<Process>> {
    PROCESSES.lock().remove(&pid)
}

pub fn process_exists(pid: ProcessId) -> bool {
    PROCESSES.lock().contains_key(&pid)
}

/// Run `f` with a reference to the process, under `threads_lock`'s
/// sibling table lock. Returns `ProcessNotFound` if `pid` is gone.
pub fn with_process<R>(pid: ProcessId, f: impl FnOnce(&Process) -> R) -> Result<R, KernelError> {
    let table = PROCESSES.lock();
    let process = table.get(&pid).ok_or(KernelError::ProcessNotFound { pid })?;
    Ok(f(process))
}

/// Like [`with_process`] but with mutable access, for the handful of
/// fields a process's own lifecycle (not another thread's fast-path)
/// mutates — currently just `parent`, on reparenting an orphan.
pub fn with_process_mut<R>(pid: ProcessId, f: impl FnOnce(&mut Process) -> R) -> Result<R, KernelError> {
    let mut table = PROCESSES.lock();
    let process = table.get_mut(&pid).ok_or(KernelError::ProcessNotFound { pid })?;
    Ok(f(process))
}

/// Reassign `child`'s parent (process teardown reparenting an orphan to
/// init, spec.md §4.F).
pub fn reparent(child: ProcessId, new_parent: ProcessId) -> Result<(), KernelError> {
    with_process_mut(child, |process| {
        process.parent = Some(new_parent);
    })
}

pub fn children_of(parent: ProcessId) -> Vec<ProcessId> {
    PROCESSES
        .lock()
        .values()
        .filter(|p| p.parent == Some(parent))
        .map(|p| p.pid)
        .collect()
}

/// A raw, stable pointer to a `Process` owned by the process table,
/// obtained while holding the table lock but usable after it's dropped —
/// the same reasoning as [`TaskPtr`]. Needed for `wait`, which has to
/// hold a reference across a condvar wait (itself a sequence of lock
/// drops and reacquires) that a plain `with_process` closure can't span.
#[derive(Clone, Copy)]
pub struct ProcessPtr(core::ptr::NonNull<Process>);

unsafe impl Send for ProcessPtr {}

impl ProcessPtr {
    pub fn as_ref(self) -> &'static Process {
        // SAFETY: the `Box<Process>` backing this pointer lives in
        // `PROCESSES` for as long as the process exists; callers only use
        // the pointer while they know (by construction, e.g. being the
        // process's own thread) it hasn't been torn down.
        unsafe { self.0.as_ref() }
    }
}

pub fn process_ptr(pid: ProcessId) -> Option<ProcessPtr> {
    let table = PROCESSES.lock();
    table.get(&pid).map(|process| ProcessPtr(core::ptr::NonNull::from(process.as_ref())))
}

pub fn insert_task(task: Task) -> ThreadId {
    let tid = task.tid;
    THREADS.lock().insert(tid, Box::new(task));
    tid
}

pub fn remove_task(tid: ThreadId) -> Option<Box<Task>> {
    THREADS.lock().remove(&tid)
}

/// Run `f` with a reference to the thread. Returns `ThreadNotFound` if
/// `tid` is gone (it may have already been reaped by `vanish`).
pub fn with_task<R>(tid: ThreadId, f: impl FnOnce(&Task) -> R) -> Result<R, KernelError> {
    let table = THREADS.lock();
    let task = table.get(&tid).ok_or(KernelError::ThreadNotFound { tid })?;
    Ok(f(task))
}

/// Like [`with_task`] but with mutable access, for fields the owning
/// thread itself updates (e.g. `wake_tick` before going on the sleep
/// heap).
pub fn with_task_mut<R>(tid: ThreadId, f: impl FnOnce(&mut Task) -> R) -> Result<R, KernelError> {
    let mut table = THREADS.lock();
    let task = table.get_mut(&tid).ok_or(KernelError::ThreadNotFound { tid })?;
    Ok(f(task))
}

/// A raw, stable pointer to a `Task` owned by the thread table, obtained
/// while holding `threads_lock` and usable after it's dropped. The
/// `Box<Task>` backing it never moves or is freed while the table still
/// holds it, so the pointer stays valid for as long as the caller holds
/// some other guarantee the thread won't be reaped concurrently (in
/// practice: its own `status_lock`, or simply being the thread itself).
/// Used by the scheduler to keep the two halves of a context switch
/// (load `to`'s context, save into `from`'s context) outside any lock —
/// a `Mutex` guard cannot be held across `switch_context`, which only
/// "returns" once some other thread later switches back into this one.
#[derive(Clone, Copy)]
pub struct TaskPtr(core::ptr::NonNull<Task>);

unsafe impl Send for TaskPtr {}

impl TaskPtr {
    pub fn as_ptr(self) -> *mut Task {
        self.0.as_ptr()
    }
}

pub fn task_ptr(tid: ThreadId) -> Option<TaskPtr> {
    let table = THREADS.lock();
    table
        .get(&tid)
        .map(|task| TaskPtr(core::ptr::NonNull::from(task.as_ref())))
}

pub fn thread_count() -> usize {
    THREADS.lock().len()
}

pub fn process_count() -> usize {
    PROCESSES.lock().len()
}

pub fn init() {
    log::info!(target: "process", "process and thread tables initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::paging::PhysicalAddress;

    #[test]
    fn pid_and_tid_allocation_is_monotonic() {
        let a = alloc_pid();
        let b = alloc_pid();
        assert!(b > a);
    }

    #[test]
    fn process_lookup_round_trips() {
        let pid = alloc_pid();
        insert_process(Process::new(pid, None, PhysicalAddress(0), 0));
        assert!(process_exists(pid));
        assert!(remove_process(pid).is_some());
        assert!(!process_exists(pid));
    }
}

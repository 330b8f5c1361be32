//! Thread-within-a-process syscalls: `THREAD_FORK`, `DESCHEDULE`,
//! `MAKE_RUNNABLE`, `VANISH`, `SWEXN` (grouped the way
//! `syscall_thread.c` groups them; `YIELD` is a one-liner dispatched
//! directly from [`super::dispatch`]).

use crate::arch::x86::trap::TrapFrame;
use crate::arch::x86::usermode::DEFAULT_EFLAGS;
use crate::exception::fault::Ureg;
use crate::mm::user_copy;
use crate::mm::{STACK_TOP, USER_MEM_START};
use crate::process::table;
use crate::sched::task::Task;

/// Only these bits of `eflags` may differ from [`DEFAULT_EFLAGS`] in a
/// `swexn` resume request (`CF|PF|AF|ZF|SF|TF|DF|OF|RF`).
const EFLAGS_USER_MASK: u32 = 0x100DD5;

/// `THREAD_FORK`: a new thread in the calling process, resuming exactly
/// where `frame` left off (registers included) except `eax`, which is 0
/// in the child the way `fork`'s child convention works.
pub fn sys_thread_fork(frame: &TrapFrame) -> i32 {
    let tid = crate::sched::current_tid();
    let (pid, pts_id) = match table::with_task(tid, |t| (t.pid, t.pts_id)) {
        Ok(v) => v,
        Err(e) => return e.to_syscall_errno(),
    };

    let child_tid = table::alloc_tid();
    let task = Task::new_forked_thread(child_tid, pid, frame, pts_id);
    table::insert_task(task);

    let joined = table::with_process(pid, |p| {
        p.live_threads.lock().push(child_tid);
        *p.refcount.lock() += 1;
    });
    if joined.is_err() {
        table::remove_task(child_tid);
        return -1;
    }

    crate::sched::wake_thread(child_tid);
    child_tid as i32
}

/// `DESCHEDULE`: `esi` holds a user pointer to a reject flag, checked
/// one last time before actually blocking so a `make_runnable` racing
/// in from another thread can't be missed.
pub fn sys_deschedule(frame: &TrapFrame) -> i32 {
    let Ok(reject) = user_copy::copy_value_from_user::<i32>(frame.esi) else { return -1 };
    let tid = crate::sched::current_tid();
    let pending_exit = table::with_task(tid, |t| t.pending_exit).unwrap_or(false);
    if reject != 0 || pending_exit {
        return 0;
    }
    crate::sched::deschedule_current();
    0
}

/// `MAKE_RUNNABLE`: `esi` holds the target tid.
pub fn sys_make_runnable(frame: &TrapFrame) -> i32 {
    match crate::sched::make_runnable(frame.esi) {
        Ok(()) => 0,
        Err(e) => e.to_syscall_errno(),
    }
}

/// `VANISH`: no arguments, exits with whatever `SET_STATUS`/`FORK`
/// default left in the process's `exit_value`. Never returns.
pub fn sys_vanish() -> ! {
    let tid = crate::sched::current_tid();
    let pid = table::with_task(tid, |t| t.pid).unwrap_or(0);
    let status = table::with_process(pid, |p| p.exit_value).unwrap_or(-1);
    crate::process::exit::task_vanish_current(status)
}

/// `SWEXN`: `esi` holds `(esp3, eip3, arg, ureg_ptr)`. Either registers
/// (or deregisters, if `esp3`/`eip3` are both 0) this thread's software
/// exception handler, and/or — if `ureg_ptr` is nonzero — resumes
/// `frame` immediately with the caller-supplied register state.
pub fn sys_swexn(frame: &mut TrapFrame) -> i32 {
    let Ok(mut esp3) = super::arg(frame, 0) else { return -1 };
    let Ok(eip3) = super::arg(frame, 1) else { return -1 };
    let Ok(arg) = super::arg(frame, 2) else { return -1 };
    let Ok(ureg_ptr) = super::arg(frame, 3) else { return -1 };

    if esp3 != 0 && eip3 != 0 {
        esp3 &= !0x3;
        let in_range = |a: u32| a >= USER_MEM_START && a < STACK_TOP;
        if !in_range(eip3) || !in_range(esp3) {
            return -2;
        }
    }

    if ureg_ptr != 0 {
        let Ok(ureg) = user_copy::copy_value_from_user::<Ureg>(ureg_ptr) else { return -2 };
        if ureg.eflags & !EFLAGS_USER_MASK != DEFAULT_EFLAGS {
            return -2;
        }
        frame.eip = ureg.eip;
        frame.eflags = ureg.eflags;
        frame.esp = ureg.esp;
        frame.eax = ureg.eax;
        frame.ecx = ureg.ecx;
        frame.edx = ureg.edx;
        frame.ebx = ureg.ebx;
        frame.ebp = ureg.ebp;
        frame.esi = ureg.esi;
        frame.edi = ureg.edi;
    } else {
        frame.eax = 0;
    }

    let tid = crate::sched::current_tid();
    let _ = table::with_task_mut(tid, |t| {
        if esp3 != 0 && eip3 != 0 {
            t.exception.esp3 = esp3;
            t.exception.eip3 = eip3;
            t.exception.arg = arg;
        } else {
            t.exception.eip3 = 0;
        }
        t.exception.in_handler = false;
    });

    frame.eax as i32
}

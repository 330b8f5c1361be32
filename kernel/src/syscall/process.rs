//! Process-lifetime syscalls: `FORK`, `EXEC`, `WAIT`, `SLEEP`,
//! `SET_STATUS`, `TASK_VANISH` (grouped the way `syscall_process.c`
//! groups them; `GETTID`/`GET_TICKS` are one-liners dispatched directly
//! from [`super::dispatch`]).

use crate::arch::x86::trap::TrapFrame;
use crate::mm::user_copy;
use crate::process::{lifecycle, table, wait};

use super::{MAX_EXECNAME_LEN, MAX_NUM_ARG};

/// `FORK`: no arguments, duplicates the caller's address space.
pub fn sys_fork(frame: &TrapFrame) -> i32 {
    match lifecycle::fork_process(frame) {
        Ok(pid) => pid as i32,
        Err(e) => e.to_syscall_errno(),
    }
}

/// `EXEC`: `esi` holds `(execname_ptr, argv_ptr)`; `argv_ptr` points at
/// a NUL-terminated array of string pointers. Never returns to the
/// syscall trampoline on success — `frame` itself now resumes at the
/// new program's entry point.
pub fn sys_exec(frame: &mut TrapFrame) -> i32 {
    let Ok(exe_ptr) = super::arg(frame, 0) else { return -1 };
    let Ok(path) = user_copy::copy_string_from_user(exe_ptr, MAX_EXECNAME_LEN) else { return -1 };
    let Ok(argv_ptr) = super::arg(frame, 1) else { return -1 };
    let Ok(args) = user_copy::copy_string_array_from_user(argv_ptr, MAX_NUM_ARG) else { return -1 };

    let Some(entry) = crate::fs::archive::lookup(&path) else { return -1 };
    let image = crate::fs::archive::bytes(&entry);

    match lifecycle::exec_process(&path, image, &args, frame) {
        Ok(()) => frame.eax as i32,
        Err(e) => e.to_syscall_errno(),
    }
}

/// `WAIT`: `esi` holds a user pointer to write the exited child's exit
/// status to, or 0 to discard it.
pub fn sys_wait(frame: &TrapFrame) -> i32 {
    let pstatus = frame.esi;
    let pid = crate::sched::current_pid();
    match wait::wait_for_child(pid) {
        Ok((child, status)) => {
            if pstatus != 0 && user_copy::copy_to_user(pstatus, &status.to_le_bytes()).is_err() {
                return -1;
            }
            child as i32
        }
        Err(e) => e.to_syscall_errno(),
    }
}

/// `SLEEP`: `esi` holds the tick count, as a signed value so `<= 0`
/// returns immediately instead of blocking.
pub fn sys_sleep(frame: &TrapFrame) -> i32 {
    let ticks = frame.esi as i32;
    if ticks <= 0 {
        return ticks;
    }
    crate::sched::sleep_ticks(ticks as u64);
    0
}

/// `SET_STATUS`: `esi` holds the exit value to report to a future
/// `wait`er; takes effect only once the process actually exits.
pub fn sys_set_status(frame: &TrapFrame) -> i32 {
    let status = frame.esi as i32;
    let tid = crate::sched::current_tid();
    let Ok(pid) = table::with_task(tid, |t| t.pid) else { return -1 };
    let _ = table::with_process_mut(pid, |p| p.exit_value = status);
    0
}

/// `TASK_VANISH`: `esi` holds the exit value; kills every thread of the
/// calling process. Never returns.
pub fn sys_task_vanish(frame: &TrapFrame) -> ! {
    let status = frame.esi as i32;
    crate::process::exit::task_vanish_process(status)
}

//! Syscall surface (component H)
//!
//! [`dispatch`] is [`crate::exception`]'s single entry point for all 26
//! syscall vectors: it demultiplexes by index (spec.md §6's table
//! order, `arch::x86::trap::SYSCALL_VEC_BASE`-relative) and returns the
//! value the trap frame's `eax` resumes with. Handlers are grouped into
//! [`process`], [`thread_clone`], [`memory`], [`io`], [`misc`] the way
//! the original groups `sys_*_real` across its `syscall_*.c` files.
//! Arguments always live relative to `frame.esi`, one word apiece, read
//! through [`crate::mm::user_copy`] so a bad pointer faults the syscall
//! rather than the kernel.

mod io;
mod memory;
mod misc;
mod process;
mod thread_clone;

use crate::arch::x86::trap::TrapFrame;

const MAX_EXECNAME_LEN: usize = 128;
const MAX_NUM_ARG: usize = 16;

/// Entered from `exception::dispatch` with `index` already computed as
/// `vector - SYSCALL_VEC_BASE`.
pub fn dispatch(index: u8, frame: &mut TrapFrame) -> i32 {
    match index {
        0 => process::sys_fork(frame),
        1 => process::sys_exec(frame),
        2 => process::sys_wait(frame),
        3 => {
            crate::sched::yield_now();
            0
        }
        4 => thread_clone::sys_deschedule(frame),
        5 => thread_clone::sys_make_runnable(frame),
        6 => crate::sched::current_tid() as i32,
        7 => memory::sys_new_pages(frame),
        8 => memory::sys_remove_pages(frame),
        9 => process::sys_sleep(frame),
        10 => io::sys_getchar() as i32,
        11 => io::sys_readline(frame),
        12 => io::sys_print(frame),
        13 => io::sys_set_term_color(frame),
        14 => io::sys_set_cursor_pos(frame),
        15 => io::sys_get_cursor_pos(frame),
        16 => thread_clone::sys_thread_fork(frame),
        17 => crate::arch::x86::timer::current_tick() as i32,
        18 => misc::sys_misbehave(frame),
        19 => misc::sys_halt(),
        20 => process::sys_task_vanish(frame),
        21 => misc::sys_new_console(),
        22 => process::sys_set_status(frame),
        23 => thread_clone::sys_vanish(),
        24 => misc::sys_readfile(frame),
        25 => thread_clone::sys_swexn(frame),
        _ => -1,
    }
}

/// Read the `index`th word of this syscall's argument block (`esi +
/// index*4`). Every handler beyond the handful that read `esi` directly
/// as a single scalar goes through this.
pub(crate) fn arg(frame: &TrapFrame, index: u32) -> crate::mm::user_copy::Result<u32> {
    crate::mm::user_copy::copy_value_from_user(frame.esi + index * 4)
}

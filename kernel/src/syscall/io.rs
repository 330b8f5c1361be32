//! Console I/O syscalls: `PRINT`, `SET_TERM_COLOR`, `SET_CURSOR_POS`,
//! `GET_CURSOR_POS`, `READLINE` (grouped the way `syscall_io.c` groups
//! them; `GETCHAR` is a one-liner dispatched directly from
//! [`super::dispatch`]).

use crate::arch::x86::trap::TrapFrame;
use crate::mm::user_copy;

fn current_pts() -> u32 {
    crate::process::table::with_task(crate::sched::current_tid(), |t| t.pts_id).unwrap_or(0)
}

/// `GETCHAR`.
pub fn sys_getchar() -> u8 {
    crate::pts::getchar()
}

/// `PRINT`: `esi` holds `(len, buf_ptr)`.
pub fn sys_print(frame: &TrapFrame) -> i32 {
    let Ok(len) = super::arg(frame, 0) else { return -1 };
    if (len as i32) < 0 {
        return -2;
    }
    let Ok(buf) = super::arg(frame, 1) else { return -1 };
    match user_copy::print_from_user(buf, len as usize) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// `SET_TERM_COLOR`: `esi` holds the color byte directly, not a
/// pointer.
pub fn sys_set_term_color(frame: &TrapFrame) -> i32 {
    match crate::pts::set_color(current_pts(), frame.esi as u8) {
        Ok(()) => 0,
        Err(()) => -1,
    }
}

/// `SET_CURSOR_POS`: `esi` holds `(row, col)`.
pub fn sys_set_cursor_pos(frame: &TrapFrame) -> i32 {
    let Ok(row) = super::arg(frame, 0) else { return -1 };
    let Ok(col) = super::arg(frame, 1) else { return -1 };
    match crate::pts::set_cursor(current_pts(), row as i32, col as i32) {
        Ok(()) => 0,
        Err(()) => -1,
    }
}

/// `GET_CURSOR_POS`: `esi` holds `(prow_ptr, pcol_ptr)`.
pub fn sys_get_cursor_pos(frame: &TrapFrame) -> i32 {
    let Ok(prow) = super::arg(frame, 0) else { return -1 };
    let Ok(pcol) = super::arg(frame, 1) else { return -1 };
    let pos = crate::pts::get_cursor(current_pts());
    if user_copy::copy_to_user(prow, &pos.row.to_le_bytes()).is_err() {
        return -1;
    }
    if user_copy::copy_to_user(pcol, &pos.col.to_le_bytes()).is_err() {
        return -1;
    }
    0
}

/// `READLINE`: `esi` holds `(len, buf_ptr)`; returns the number of
/// bytes actually placed in the caller's buffer.
pub fn sys_readline(frame: &TrapFrame) -> i32 {
    let Ok(len) = super::arg(frame, 0) else { return -1 };
    if (len as i32) < 0 {
        return -1;
    }
    let Ok(buf) = super::arg(frame, 1) else { return -1 };

    let mut kernel_buf = alloc::vec![0u8; len as usize];
    let n = crate::pts::readline(&mut kernel_buf);
    if user_copy::copy_to_user(buf, &kernel_buf[..n]).is_err() {
        return -1;
    }
    n as i32
}

extern crate alloc;

//! `MISBEHAVE`, `HALT`, `READFILE`, `NEW_CONSOLE` (grouped the way
//! `syscall_misc.c` groups them).

use crate::arch::x86::trap::TrapFrame;
use crate::mm::user_copy;

const MAX_FILENAME_LEN: usize = 128;

/// `MISBEHAVE`: testing-mode toggle; `esi` holds the requested mode.
/// Always succeeds.
pub fn sys_misbehave(frame: &TrapFrame) -> i32 {
    let mode = if frame.esi != 0 {
        crate::sched::task::MisbehaveMode::ForceKernelFault
    } else {
        crate::sched::task::MisbehaveMode::Normal
    };
    let tid = crate::sched::current_tid();
    let _ = crate::process::table::with_task_mut(tid, |t| t.misbehave = mode);
    0
}

/// `HALT`: stop the machine. Never returns.
pub fn sys_halt() -> ! {
    log::info!(target: "syscall", "halt requested, stopping CPU");
    loop {
        crate::arch::x86::hlt();
    }
}

/// `READFILE`: `esi` holds `(filename_ptr, buf_ptr, count, offset)`.
/// The special name `"."` lists the archive's own entry names, NUL
/// separated with a trailing NUL, instead of reading a file.
pub fn sys_readfile(frame: &TrapFrame) -> i32 {
    let Ok(name_ptr) = super::arg(frame, 0) else { return -1 };
    let Ok(buf) = super::arg(frame, 1) else { return -1 };
    let Ok(count) = super::arg(frame, 2) else { return -1 };
    let Ok(offset) = super::arg(frame, 3) else { return -1 };
    if (count as i32) < 0 || (offset as i32) < 0 {
        return -1;
    }
    let Ok(name) = user_copy::copy_string_from_user(name_ptr, MAX_FILENAME_LEN) else { return -1 };

    if name == "." {
        return read_directory(buf, count as usize, offset as usize);
    }

    let Some(entry) = crate::fs::archive::lookup(&name) else { return -1 };
    let bytes = crate::fs::archive::bytes(&entry);
    if offset as usize > bytes.len() {
        return -1;
    }
    let size = (bytes.len() - offset as usize).min(count as usize);
    if user_copy::copy_to_user(buf, &bytes[offset as usize..offset as usize + size]).is_err() {
        return -1;
    }
    size as i32
}

/// Serialize the archive's directory (each name, NUL-terminated, back
/// to back, with one final NUL marking the end) into `[offset, offset +
/// count)` of that virtual listing and copy that window to `buf`.
fn read_directory(buf: u32, count: usize, offset: usize) -> i32 {
    let mut listing = alloc::vec::Vec::new();
    for name in crate::fs::archive::list() {
        listing.extend_from_slice(name.as_bytes());
        listing.push(0);
    }
    if offset >= listing.len() {
        if offset == listing.len() && count > 0 {
            return if user_copy::copy_to_user(buf, &[0u8]).is_ok() { 1 } else { -1 };
        }
        return 0;
    }
    let size = (listing.len() - offset).min(count);
    if user_copy::copy_to_user(buf, &listing[offset..offset + size]).is_err() {
        return -1;
    }
    size as i32
}

/// `NEW_CONSOLE`: allocate and foreground a new virtual terminal,
/// rebinding the calling thread's own I/O to it.
pub fn sys_new_console() -> i32 {
    let new_id = crate::pts::new_console();
    let tid = crate::sched::current_tid();
    let _ = crate::process::table::with_task_mut(tid, |t| t.pts_id = new_id);
    0
}

extern crate alloc;

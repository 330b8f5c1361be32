//! Memory syscalls: `NEW_PAGES`, `REMOVE_PAGES` (spec.md §6, grounded on
//! `syscall_memory.c`).

use crate::arch::x86::trap::TrapFrame;
use crate::mm::paging::PAGE_SIZE;
use crate::process::{memory, table};

/// `NEW_PAGES`: `esi` holds `(base, len)`, both page-aligned. Adds a
/// fresh zero-filled, writable region at `base`.
pub fn sys_new_pages(frame: &TrapFrame) -> i32 {
    let Ok(base) = super::arg(frame, 0) else { return -1 };
    let Ok(len) = super::arg(frame, 1) else { return -1 };
    if len == 0 || len % PAGE_SIZE as u32 != 0 || base % PAGE_SIZE as u32 != 0 {
        return -1;
    }

    let tid = crate::sched::current_tid();
    let Ok(pid) = table::with_task(tid, |t| t.pid) else { return -1 };
    let Ok(pd_phys) = table::with_process(pid, |p| p.cr3) else { return -1 };

    let result = table::with_process(pid, |p| {
        let mut regions = p.regions.lock();
        memory::add_zfod_region(&mut regions, pd_phys.0, base, len / PAGE_SIZE as u32, true)
    });

    match result {
        Ok(Ok(())) => 0,
        _ => -1,
    }
}

/// `REMOVE_PAGES`: `esi` holds the base address a prior `NEW_PAGES`
/// returned. Only the exact base of a still-live region is accepted.
pub fn sys_remove_pages(frame: &TrapFrame) -> i32 {
    let base = frame.esi;
    let tid = crate::sched::current_tid();
    let Ok(pid) = table::with_task(tid, |t| t.pid) else { return -1 };
    let Ok(pd_phys) = table::with_process(pid, |p| p.cr3) else { return -1 };

    let result = table::with_process(pid, |p| {
        let mut regions = p.regions.lock();
        memory::remove_region(&mut regions, pd_phys.0, base)
    });

    match result {
        Ok(Ok(())) => 0,
        _ => -1,
    }
}

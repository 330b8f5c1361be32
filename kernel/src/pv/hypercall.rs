//! Hypercall dispatch (spec.md §4.J "Hypercalls")
//!
//! Entered through the single dedicated trap gate (`HV_INT`): `eax` is
//! the opcode, `esp` points at the op's argument tuple on the guest
//! stack. Every op operates on the calling thread's process's
//! [`super::PvBlock`]; a process with no PV block reaching here is a
//! host bug, not a guest fault, and panics.

use crate::arch::x86::trap::TrapFrame;
use crate::arch::x86::usermode::DEFAULT_EFLAGS;
use crate::mm::paging::PhysicalAddress;
use crate::mm::user_copy;
use crate::process::table as ptable;

use super::shadow;

pub const HV_MAGIC_COOKIE: u32 = 0x5041_5241; // "PARA"

/// Guest-controllable EFLAGS bits an `iret` is allowed to restore
/// directly: CF, PF, AF, ZF, SF, TF, DF, OF, RF. Everything else (IF,
/// IOPL, the reserved bit 1) is kernel-owned and validated separately.
const EFLAGS_PV_MASK: u32 = 0x0010_0DD5;
const EFL_IF: u32 = 1 << 9;
const EFL_RESV1: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HvOp {
    Magic = 0,
    Exit = 1,
    Iret = 2,
    SetIdt = 3,
    Disable = 4,
    Enable = 5,
    SetPd = 6,
    AdjustPg = 7,
    Print = 8,
    SetColor = 9,
    SetCursor = 10,
    GetCursor = 11,
    PrintAt = 12,
    RefPd = 13,
    UnrefPd = 14,
    LoadPd = 15,
}

impl HvOp {
    pub fn from_u32(v: u32) -> Option<Self> {
        use HvOp::*;
        Some(match v {
            0 => Magic,
            1 => Exit,
            2 => Iret,
            3 => SetIdt,
            4 => Disable,
            5 => Enable,
            6 => SetPd,
            7 => AdjustPg,
            8 => Print,
            9 => SetColor,
            10 => SetCursor,
            11 => GetCursor,
            12 => PrintAt,
            13 => RefPd,
            14 => UnrefPd,
            15 => LoadPd,
            _ => return None,
        })
    }
}

/// Entered from the hypercall trap handler with `op` already decoded
/// from `eax` and `arg_ptr` pointing at the guest's argument tuple.
/// `frame` is the trap frame the guest will resume into; only `Iret`
/// rewrites it. Returns the value to place in the guest's `eax` on
/// return, or `None` if the guest is terminated.
pub fn dispatch(pid: crate::process::pcb::ProcessId, op: u32, arg_ptr: u32, frame: &mut TrapFrame) -> Option<i32> {
    let op = match HvOp::from_u32(op) {
        Some(op) => op,
        None => {
            super::pv_die("unknown hypercall op");
            return None;
        }
    };

    let result = ptable::with_process(pid, |process| {
        let mut pv_guard = process.pv.lock();
        let pv = match pv_guard.as_mut() {
            Some(pv) => pv,
            None => return Err("hypercall on non-PV process"),
        };

        Ok(match op {
            HvOp::Magic => HV_MAGIC_COOKIE as i32,
            HvOp::Exit => return Err("guest exited"),
            HvOp::Disable => {
                pv.mask_interrupt();
                0
            }
            HvOp::Enable => {
                pv.unmask_interrupt();
                0
            }
            HvOp::SetIdt => {
                let (index, eip, dpl): (u32, u32, u32) = read_triple(arg_ptr);
                if pv.vidt.set(index as usize, eip, dpl as u8) { 0 } else { -1 }
            }
            HvOp::SetPd => {
                let (guest_pd, wp): (u32, u32) = read_pair(arg_ptr);
                pv.select_pd(PhysicalAddress(guest_pd), wp != 0);
                0
            }
            HvOp::LoadPd => {
                let guest_pd: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
                let wp = pv.active_shadow.as_ref().map(|s| s.wp).unwrap_or(false);
                pv.select_pd(PhysicalAddress(guest_pd), wp);
                0
            }
            HvOp::AdjustPg => {
                let vaddr: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
                match shadow::adjust_page(pv, vaddr) {
                    Ok(()) => 0,
                    Err(_) => -1,
                }
            }
            HvOp::RefPd => {
                if let Some(shadow) = pv.active_shadow.as_mut() {
                    shadow.refcount += 1;
                }
                0
            }
            HvOp::UnrefPd => {
                if let Some(shadow) = pv.active_shadow.as_mut() {
                    shadow.refcount = shadow.refcount.saturating_sub(1);
                }
                0
            }
            HvOp::Iret => {
                let (eip, eflags_raw, esp, vesp0_marker, eax): (u32, u32, u32, u32, u32) = read_five(arg_ptr);

                let eflags_user = eflags_raw & EFLAGS_PV_MASK;
                let eflags_kernel = eflags_raw & !EFLAGS_PV_MASK;
                if (eflags_kernel & !(EFL_IF | EFL_RESV1)) != 0 {
                    return Err("bad eflags value in iret");
                }
                if eflags_kernel & EFL_IF != 0 {
                    pv.unmask_interrupt();
                } else {
                    pv.mask_interrupt();
                }

                frame.eip = eip;
                frame.eflags = eflags_user | DEFAULT_EFLAGS;
                frame.esp = esp;
                if vesp0_marker != 0 {
                    pv.vesp0 = vesp0_marker;
                    if let Some(shadow) = pv.active_shadow.as_ref() {
                        // SAFETY: the user-mode shadow is a translation
                        // of the guest's currently active PD, built by
                        // `shadow::build` and kept alive by `pv`.
                        unsafe { crate::arch::x86::load_cr3(shadow.user_cr3.0) };
                    }
                }
                eax as i32
            }
            HvOp::Print => {
                let (len, base): (u32, u32) = read_pair(arg_ptr);
                if (len as i32) < 0 {
                    return Err("bad print length");
                }
                match user_copy::print_from_user(base, len as usize) {
                    Ok(()) => 0,
                    Err(_) => -1,
                }
            }
            HvOp::SetColor => {
                let color: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
                match crate::pts::set_color(crate::pts::current_pts_id(), color as u8) {
                    Ok(()) => 0,
                    Err(()) => -1,
                }
            }
            HvOp::SetCursor => {
                let (row, col): (u32, u32) = read_pair(arg_ptr);
                match crate::pts::set_cursor(crate::pts::current_pts_id(), row as i32, col as i32) {
                    Ok(()) => 0,
                    Err(()) => -1,
                }
            }
            HvOp::GetCursor => {
                let (prow_ptr, pcol_ptr): (u32, u32) = read_pair(arg_ptr);
                let pos = crate::pts::get_cursor(crate::pts::current_pts_id());
                if user_copy::copy_to_user(prow_ptr, &pos.row.to_ne_bytes()).is_err()
                    || user_copy::copy_to_user(pcol_ptr, &pos.col.to_ne_bytes()).is_err()
                {
                    return Err("bad argument address in get_cursor");
                }
                0
            }
            HvOp::PrintAt => {
                let (len, base, row, col, color): (u32, u32, u32, u32, u32) = read_five(arg_ptr);
                if (len as i32) < 0 {
                    return Err("bad print_at length");
                }
                let id = crate::pts::current_pts_id();
                let old_cursor = crate::pts::get_cursor(id);
                let old_color = crate::pts::get_color(id);
                if crate::pts::set_cursor(id, row as i32, col as i32).is_err() {
                    -1
                } else if crate::pts::set_color(id, color as u8).is_err() {
                    let _ = crate::pts::set_cursor(id, old_cursor.row, old_cursor.col);
                    -1
                } else if user_copy::print_from_user(base, len as usize).is_err() {
                    let _ = crate::pts::set_color(id, old_color);
                    let _ = crate::pts::set_cursor(id, old_cursor.row, old_cursor.col);
                    -1
                } else {
                    let _ = crate::pts::set_color(id, old_color);
                    let _ = crate::pts::set_cursor(id, old_cursor.row, old_cursor.col);
                    0
                }
            }
        })
    });

    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(reason)) => {
            super::pv_die(reason);
            None
        }
        Err(_) => {
            super::pv_die("hypercall on dead process");
            None
        }
    }
}

fn read_pair(arg_ptr: u32) -> (u32, u32) {
    let a: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
    let b: u32 = user_copy::copy_value_from_user(arg_ptr + 4).unwrap_or(0);
    (a, b)
}

fn read_triple(arg_ptr: u32) -> (u32, u32, u32) {
    let a: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
    let b: u32 = user_copy::copy_value_from_user(arg_ptr + 4).unwrap_or(0);
    let c: u32 = user_copy::copy_value_from_user(arg_ptr + 8).unwrap_or(0);
    (a, b, c)
}

fn read_five(arg_ptr: u32) -> (u32, u32, u32, u32, u32) {
    let a: u32 = user_copy::copy_value_from_user(arg_ptr).unwrap_or(0);
    let b: u32 = user_copy::copy_value_from_user(arg_ptr + 4).unwrap_or(0);
    let c: u32 = user_copy::copy_value_from_user(arg_ptr + 8).unwrap_or(0);
    let d: u32 = user_copy::copy_value_from_user(arg_ptr + 12).unwrap_or(0);
    let e: u32 = user_copy::copy_value_from_user(arg_ptr + 16).unwrap_or(0);
    (a, b, c, d, e)
}

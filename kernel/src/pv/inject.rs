//! Interrupt injection and fault reflection (spec.md §4.J "Interrupt
//! injection", "Fault reflection")
//!
//! Both paths push the same five-word frame onto the guest's stack and
//! redirect execution to a vIDT-installed handler; they differ only in
//! how the vIDT index is chosen and in where the frame's `cr2`/
//! `error_code` come from.

use crate::arch::x86::gdt;
use crate::arch::x86::trap::TrapFrame;
use crate::mm::paging::PhysicalAddress;
use crate::mm::user_copy;
use crate::process::table as ptable;

use super::vidt::VidtEntry;
use super::PvBlock;

/// `(cr2, error_code, eip, vcs, eflags)` pushed onto the guest stack
/// (`pv_frame_t`).
#[repr(C)]
#[derive(Clone, Copy)]
struct PvFrame {
    cr2: u32,
    error_code: u32,
    eip: u32,
    vcs: u32,
    eflags: u32,
}

impl PvFrame {
    fn as_bytes(&self) -> &[u8] {
        // SAFETY: plain `u32` fields, no padding, any bit pattern valid.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, core::mem::size_of::<Self>()) }
    }
}

/// Timer/keyboard IRQ delivery. If the guest isn't currently executing or
/// has interrupts virtually masked, the event is recorded pending and
/// delivered later by [`check_pending_irq`]; otherwise it's pushed now.
pub fn inject_irq(pid: crate::process::pcb::ProcessId, frame: &mut TrapFrame, irq_index: usize, arg: u32) {
    let _ = ptable::with_process(pid, |process| {
        let mut guard = process.pv.lock();
        let Some(pv) = guard.as_mut() else { return };

        if frame.cs as u16 != gdt::pv_cs_selector() || !pv.vif {
            if let Some(slot) = pv.vidt.pending_irq_mut(irq_index) {
                slot.pending = true;
                slot.arg = arg;
            }
            return;
        }

        let Some(entry) = pv.vidt.get(irq_index) else { return };
        deliver(pv, frame, entry, 0, 0);
    });
}

/// Called at every return-to-user for a PV guest thread: if vIF just
/// became open and an IRQ is pending, deliver it now.
pub fn check_pending_irq(pid: crate::process::pcb::ProcessId, frame: &mut TrapFrame) {
    let _ = ptable::with_process(pid, |process| {
        let mut guard = process.pv.lock();
        let Some(pv) = guard.as_mut() else { return };
        if !pv.vif {
            return;
        }
        for index in super::vidt::IRQ_START..super::vidt::IRQ_END {
            let Some(slot) = pv.vidt.pending_irq_mut(index) else { continue };
            if !slot.pending {
                continue;
            }
            slot.pending = false;
            let arg = slot.arg;
            if let Some(entry) = pv.vidt.get(index) {
                deliver(pv, frame, entry, 0, 0);
            }
            return;
        }
        let _ = arg_unused();
    });
}

fn arg_unused() {}

/// Fault reflection: a real CPU fault trapped while the PV code segment
/// was active. Consult the vIDT (falling back to the guest's
/// protection-fault handler per spec.md §4.J), or kill the guest if
/// nothing is installed.
pub fn handle_guest_fault(pid: crate::process::pcb::ProcessId, frame: &mut TrapFrame) {
    let cr2 = crate::arch::x86::read_cr2();
    let error_code = frame.error_code;
    let vector = frame.vector as usize;

    let handled = ptable::with_process(pid, |process| {
        let mut guard = process.pv.lock();
        let Some(pv) = guard.as_mut() else { return false };

        let entry = classify(pv, vector, cr2);
        match entry {
            Some(entry) => {
                deliver(pv, frame, entry, cr2, error_code);
                true
            }
            None => false,
        }
    });

    if handled != Ok(true) {
        super::pv_die("unhandled guest fault, no vIDT entry installed");
    }
}

/// Fault-vector classification: fall back to the guest's protection-fault
/// handler (vector 13) when the natural handler is kernel-only (DPL 0)
/// but the fault happened outside the guest-kernel boundary.
fn classify(pv: &PvBlock, vector: usize, fault_addr: u32) -> Option<VidtEntry> {
    let entry = pv.vidt.get(vector)?;
    if entry.dpl == 0 && fault_addr < super::PV_VM_LIMIT {
        return pv.vidt.get(13);
    }
    Some(entry)
}

/// Push a [`PvFrame`] onto the guest's stack and redirect `frame` to
/// `entry`'s handler, switching from the user-mode shadow to the
/// kernel-mode shadow if the guest was running guest-user code.
fn deliver(pv: &mut PvBlock, frame: &mut TrapFrame, entry: VidtEntry, cr2: u32, error_code: u32) {
    let Some(shadow) = pv.active_shadow.as_ref() else {
        return;
    };

    let current_cr3 = PhysicalAddress(crate::arch::x86::read_cr3());
    let in_kernel = current_cr3 == shadow.cr3;

    if !in_kernel {
        // SAFETY: the kernel-mode shadow carries the OS kernel's own
        // low-memory PDEs (spec.md §8 invariant 7), so execution survives
        // the switch.
        unsafe { crate::arch::x86::load_cr3(shadow.cr3.0) };
    }

    let target_esp = if in_kernel { frame.esp } else { pv.vesp0 };
    let pushed = PvFrame { cr2, error_code, eip: frame.eip, vcs: frame.cs, eflags: frame.eflags };
    let new_esp = target_esp - core::mem::size_of::<PvFrame>() as u32;
    if user_copy::copy_to_user(new_esp, pushed.as_bytes()).is_err() {
        super::pv_die("fault/IRQ delivery to a guest with a bad stack");
        return;
    }

    pv.vif = false;
    pv.vesp0 = new_esp;
    frame.eip = entry.eip;
    frame.esp = new_esp;
}

//! Exception dispatch (spec.md component G, §4.G)
//!
//! Entered from [`crate::arch::x86::trap::trap_dispatch`] with a single
//! normalized register frame regardless of vector. `dispatch` demuxes by
//! vector: CPU exceptions 0-19 go through [`handle_fault`]'s five-step
//! order, the timer and keyboard IRQs drive the scheduler tick and the
//! console multiplexer, the 26 syscall vectors go to
//! [`crate::syscall::dispatch`], and the hypercall vector goes to
//! [`crate::pv::hypercall::dispatch`].

pub mod fault;

use crate::arch::x86::gdt;
use crate::arch::x86::legacy;
use crate::arch::x86::trap::{self, TrapFrame};
use crate::arch::x86::usermode::DEFAULT_EFLAGS;
use crate::mm::page_fault::{self, PageFaultOutcome};
use crate::mm::paging::VirtualAddress;
use crate::mm::{user_copy, USER_MEM_START};

pub use fault::{reason_str, FaultCause};

const SWEXN_CAUSE_PAGEFAULT: u32 = 14;
const SWEXN_CAUSE_PROTFAULT: u32 = 13;

/// Virtual IDT indices the timer and keyboard IRQs inject at (spec.md
/// §4.J's IRQ slot range, `vidt::IRQ_START..IRQ_END`).
const VIRQ_TIMER: usize = 32;
const VIRQ_KEYBOARD: usize = 33;

/// Entered once per trap, on the trapping CPU's own kernel stack.
pub fn dispatch(frame: &mut TrapFrame) {
    match frame.vector as u8 {
        0..=19 => handle_fault(frame),
        v if v == crate::arch::x86::idt::VEC_TIMER => {
            crate::arch::x86::timer::on_tick();
            crate::pv::inject::inject_irq(current_pid(), frame, VIRQ_TIMER, 0);
            legacy::send_eoi(0);
        }
        v if v == crate::arch::x86::idt::VEC_KEYBOARD => {
            let scancode = read_scancode();
            crate::pts::on_scancode(scancode);
            crate::pv::inject::inject_irq(current_pid(), frame, VIRQ_KEYBOARD, scancode as u32);
            legacy::send_eoi(1);
        }
        v if v == trap::HYPERCALL_VEC => {
            let pid = current_pid();
            let (op, arg_ptr) = (frame.eax, frame.esp);
            match crate::pv::hypercall::dispatch(pid, op, arg_ptr, frame) {
                Some(value) => frame.eax = value as u32,
                None => {
                    // The guest was killed; this thread never resumes
                    // through this frame (`task_vanish_current` doesn't
                    // return), but keep `eax` deterministic regardless.
                    frame.eax = u32::MAX;
                }
            }
        }
        v if (trap::SYSCALL_VEC_BASE..trap::SYSCALL_VEC_BASE + trap::SYSCALL_VEC_COUNT).contains(&v) => {
            let index = v - trap::SYSCALL_VEC_BASE;
            frame.eax = crate::syscall::dispatch(index, frame) as u32;
        }
        _ => handle_fault(frame),
    }

    // Deliver a queued IRQ the instant vIF reopens (spec.md §4.J); a
    // no-op for threads with no PV block.
    crate::pv::inject::check_pending_irq(current_pid(), frame);

    // A sibling thread's `task_vanish_process` may have marked this
    // thread for exit while it was off-CPU; catch it here; the last
    // point before control actually returns to user code, rather than
    // reaping it out from under the ready queue or sleep heap.
    if trap::from_user_mode(frame) {
        let tid = crate::sched::current_tid();
        if crate::process::table::with_task(tid, |t| t.pending_exit).unwrap_or(false) {
            let status = crate::process::table::with_process(current_pid(), |p| p.exit_value).unwrap_or(0);
            crate::process::exit::task_vanish_current(status);
        }
    }
}

fn current_pid() -> crate::process::pcb::ProcessId {
    crate::process::table::with_task(crate::sched::current_tid(), |t| t.pid).unwrap_or(0)
}

fn read_scancode() -> u8 {
    // SAFETY: fixed legacy keyboard controller data port.
    unsafe { x86::io::inb(0x60) }
}

/// Implements spec.md §4.G's five-step dispatch order for CPU exceptions.
fn handle_fault(frame: &mut TrapFrame) {
    let cr2 = crate::arch::x86::read_cr2();

    // 1. ZFOD attempt.
    if frame.vector == SWEXN_CAUSE_PAGEFAULT && cr2 >= USER_MEM_START {
        if try_zfod(cr2) {
            return;
        }
    }

    // 2. PV guest delegation.
    if frame.cs as u16 == gdt::pv_cs_selector() {
        let pid = crate::process::table::with_task(crate::sched::current_tid(), |t| t.pid).unwrap_or(0);
        crate::pv::inject::handle_guest_fault(pid, frame);
        return;
    }

    // 3. eip0 kernel-fault recovery.
    if frame.cs as u16 == crate::arch::x86::gdt::SEGSEL_KERNEL_CS {
        if matches!(frame.vector, SWEXN_CAUSE_PAGEFAULT | SWEXN_CAUSE_PROTFAULT) {
            let eip0 = crate::process::table::with_task(crate::sched::current_tid(), |t| t.eip0).unwrap_or(0);
            if eip0 != 0 {
                frame.eip = eip0;
                return;
            }
        }
        // Unrecoverable kernel fault.
        log::error!(
            target: "exception",
            "unrecoverable kernel fault {} at eip={:#x} cr2={:#x} err={:#x}",
            reason_str(frame.vector), frame.eip, cr2, frame.error_code,
        );
        loop {
            crate::arch::x86::hlt();
        }
    }

    // 4. User swexn reflection.
    if try_deliver_swexn(frame, cr2) {
        return;
    }

    // 5. Kill.
    kill_current(frame, cr2);
}

/// Resolve `cr2` against the current process's page tables if a ZFOD PTE
/// covers it; returns true if the fault was resolved and the instruction
/// should retry.
fn try_zfod(cr2: u32) -> bool {
    use crate::arch::x86::irq::without_interrupts;
    use crate::mm::paging::{map_phys_page, PageDirectory, PageTable};

    without_interrupts(|| {
        let cr3 = crate::arch::x86::read_cr3();
        let va = VirtualAddress(cr2);

        let pd_vaddr = map_phys_page(cr3);
        let pde = unsafe { (*(pd_vaddr as *const PageDirectory)).entries[va.pd_index()] };
        if !pde.is_present() {
            return false;
        }
        let pt_phys = pde.frame_base();
        let pt_vaddr = map_phys_page(pt_phys);
        let pt = unsafe { &mut *(pt_vaddr as *mut PageTable) };
        let pte_ref = &mut pt.entries[va.pt_index()];
        let was_present = pte_ref.is_present();
        matches!(page_fault::try_resolve_zfod(Some(pte_ref), was_present), PageFaultOutcome::Resolved)
    })
}

/// Build a `ureg` on the thread's registered exception stack and jump to
/// its handler, per spec.md §4.G step 4. Returns false (and leaves
/// `frame` untouched) if there is no handler, it's already in use, or
/// delivery itself faults.
fn try_deliver_swexn(frame: &mut TrapFrame, cr2: u32) -> bool {
    if !trap::from_user_mode(frame) {
        return false;
    }
    let tid = crate::sched::current_tid();
    let Some(exc) = crate::process::table::with_task(tid, |t| t.exception) else {
        return false;
    };
    if exc.eip3 == 0 || exc.in_handler {
        return false;
    }

    let ureg = fault::Ureg::from_trap_frame(frame, cr2);
    let mut esp3 = exc.esp3 & !0x3;
    esp3 -= core::mem::size_of::<fault::Ureg>() as u32;
    esp3 &= !0x3;
    if user_copy::copy_to_user(esp3, fault::Ureg::as_bytes(&ureg)).is_err() {
        return false;
    }

    let stack_words: [u32; 3] = [0, exc.arg, esp3];
    let new_esp = esp3 - 12;
    if user_copy::copy_to_user(new_esp, bytes_of_u32_slice(&stack_words)).is_err() {
        return false;
    }

    crate::process::table::with_task_mut(tid, |t| {
        t.exception.in_handler = true;
        t.exception.eip3 = 0;
    });

    frame.edi = 0;
    frame.esi = 0;
    frame.ebp = 0;
    frame.ebx = 0;
    frame.edx = 0;
    frame.ecx = 0;
    frame.eax = 0;
    frame.eip = exc.eip3;
    frame.eflags = DEFAULT_EFLAGS;
    frame.esp = new_esp;
    true
}

fn bytes_of_u32_slice(words: &[u32; 3]) -> &[u8] {
    // SAFETY: `[u32; 3]` has no padding and any bit pattern is valid.
    unsafe { core::slice::from_raw_parts(words.as_ptr() as *const u8, core::mem::size_of::<[u32; 3]>()) }
}

/// No handler could run; kill the thread (spec.md §4.G step 5).
fn kill_current(frame: &TrapFrame, cr2: u32) {
    let tid = crate::sched::current_tid();
    log::warn!(
        target: "exception",
        "thread {} killed: {} (eip={:#x} cr2={:#x})",
        tid, reason_str(frame.vector), frame.eip, cr2,
    );
    crate::pts::write_current(alloc::format!("LWP {} killed: {}\n", tid, reason_str(frame.vector)).as_bytes());
    crate::process::exit::task_vanish_current(-2);
}

extern crate alloc;

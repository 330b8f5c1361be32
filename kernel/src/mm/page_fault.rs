//! Page-fault handling
//!
//! ZFOD (zero-fill-on-demand) is represented by a present-bit-clear PTE
//! whose frame field already names the pre-allocated physical frame: on
//! fault, [`handle_page_fault`] zero-fills that frame through the scratch
//! slot, sets the present bit, invalidates the TLB entry, and resumes —
//! the fastest path and tried first. If the address has no ZFOD PTE at
//! all, the fault is handed to [`crate::exception`] for the rest of the
//! dispatch order (PV guest delegation, `eip0` kernel recovery, `swexn`
//! user reflection, then kill).

use crate::mm::paging::{map_phys_page, PageFlags, Pte, VirtualAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultOutcome {
    /// A ZFOD page was populated; the faulting instruction should retry.
    Resolved,
    /// No ZFOD mapping covers this address; caller must continue dispatch.
    Unhandled,
}

/// Attempt to resolve `fault_addr` as a ZFOD fault against the given
/// process's page tables. `was_write`/`was_present` come straight off the
/// hardware error code.
pub fn try_resolve_zfod(
    pt_entry: Option<&mut Pte>,
    was_present: bool,
) -> PageFaultOutcome {
    if was_present {
        // A present-bit violation is never a ZFOD fault (ZFOD PTEs are,
        // by construction, not-present); some other path owns it.
        return PageFaultOutcome::Unhandled;
    }
    let Some(pte) = pt_entry else {
        return PageFaultOutcome::Unhandled;
    };
    if pte.frame_base() == 0 {
        return PageFaultOutcome::Unhandled;
    }

    let frame = pte.frame_base();
    zero_fill_frame(frame);
    *pte = Pte::new(frame, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER);
    PageFaultOutcome::Resolved
}

fn zero_fill_frame(frame_phys: u32) {
    let va = map_phys_page(frame_phys);
    // SAFETY: `map_phys_page` just installed a writable mapping for
    // exactly one page at `va`.
    unsafe {
        core::ptr::write_bytes(va as *mut u8, 0, crate::mm::PAGE_SIZE);
    }
}

/// True if `addr` falls in the guard page immediately below the current
/// thread's mapped stack range — used only to produce a clearer
/// diagnostic; the original kernel does not auto-grow the stack.
pub fn is_stack_guard_page(addr: VirtualAddress, stack_low: u32) -> bool {
    addr.page_aligned_down().0 == stack_low - crate::mm::PAGE_SIZE as u32
}

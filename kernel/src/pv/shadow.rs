//! Shadow page-directory translation (spec.md §4.J "Shadow page
//! directories")
//!
//! Each time a guest installs a new CR3 via `setpd`, its page directory
//! is walked once and translated into two shadow PDs: the kernel-mode
//! shadow exposes every guest-present page at user privilege; the
//! user-mode shadow exposes only guest-user pages. Guest frame numbers
//! are rebased by `mem_base`; anything outside the guest's allotted
//! memory is redirected to a sentinel frame rather than trusted.

extern crate alloc;

use alloc::boxed::Box;

use crate::mm::paging::{self, PageDirectory, PageFlags, PageTable, PhysicalAddress, Pte, PAGE_SIZE};

use super::PvBlock;

/// `(refcount, guest_pd_pa, wp_flag, kernel_mode_cr3, user_mode_cr3)`
/// (spec.md §3 "Shadow PD").
pub struct ShadowPd {
    pub refcount: u32,
    pub guest_pd: PhysicalAddress,
    pub wp: bool,
    pub cr3: PhysicalAddress,
    pub user_cr3: PhysicalAddress,
}

/// Allocate one zeroed page-aligned frame to hold a `PageDirectory` or
/// `PageTable` (also used by [`super::PvBlock::new`] for its sentinel
/// frame, which needs the same zeroing).
pub(super) fn alloc_table_frame() -> Result<PhysicalAddress, crate::error::KernelError> {
    let frame = crate::mm::frame_allocator::alloc_user_frames(1)?;
    let pa = frame.addr();
    unsafe {
        let va = paging::map_phys_page(pa);
        core::ptr::write_bytes(va as *mut u8, 0, PAGE_SIZE);
    }
    Ok(PhysicalAddress(pa))
}

/// Translate a single guest PTE into the corresponding shadow PTE for
/// both shadow PDs, per the visibility/writability rules in spec.md
/// §4.J. `mem_base`/`n_pages` bound the guest's allotted physical range;
/// out-of-range frames are redirected to `sentinel`.
fn translate_pte(
    guest_pte: Pte,
    mem_base: PhysicalAddress,
    n_pages: u32,
    wp: bool,
    sentinel: PhysicalAddress,
) -> (Pte, Option<Pte>) {
    if !guest_pte.is_present() {
        return (Pte::empty(), None);
    }

    let guest_frame = guest_pte.frame_base();
    let guest_page_no = guest_frame / PAGE_SIZE as u32;
    let in_range = guest_page_no < n_pages;
    let real_frame = if in_range {
        mem_base.0 + guest_page_no * PAGE_SIZE as u32
    } else {
        sentinel.0
    };

    let guest_flags = guest_pte.flags();
    let writable = if wp {
        guest_flags.contains(PageFlags::WRITABLE)
    } else {
        true
    };

    let mut kernel_flags = PageFlags::PRESENT | PageFlags::USER;
    if writable {
        kernel_flags |= PageFlags::WRITABLE;
    }
    let kernel_pte = Pte::new(real_frame, kernel_flags);

    let user_pte = if guest_flags.contains(PageFlags::USER) {
        Some(kernel_pte)
    } else {
        None
    };

    (kernel_pte, user_pte)
}

/// Walk the whole guest PD at `guest_pd` and build both shadow PDs from
/// scratch.
fn build(pv: &PvBlock, guest_pd: PhysicalAddress, wp: bool) -> Result<ShadowPd, crate::error::KernelError> {
    crate::arch::x86::irq::without_interrupts(|| build_inner(pv, guest_pd, wp))
}

fn build_inner(pv: &PvBlock, guest_pd: PhysicalAddress, wp: bool) -> Result<ShadowPd, crate::error::KernelError> {
    let kernel_pd_pa = alloc_table_frame()?;
    let user_pd_pa = alloc_table_frame()?;
    let sentinel = pv.sentinel;

    let guest_pd_va = paging::map_phys_page(guest_pd.0);
    let guest_entries: [Pte; 1024] = unsafe { (*(guest_pd_va as *const PageDirectory)).entries };

    for (pd_index, guest_pde) in guest_entries.iter().enumerate() {
        if !guest_pde.is_present() {
            continue;
        }

        let kernel_pt_pa = alloc_table_frame()?;
        let user_pt_pa = alloc_table_frame()?;

        let guest_pt_va = paging::map_phys_page(guest_pde.frame_base());
        let guest_pt_entries: [Pte; 1024] = unsafe { (*(guest_pt_va as *const PageTable)).entries };

        let kernel_pt_va = paging::map_phys_page(kernel_pt_pa.0);
        for (pt_index, guest_pte) in guest_pt_entries.iter().enumerate() {
            let (kernel_pte, _) = translate_pte(*guest_pte, pv.mem_base, pv.n_pages, wp, sentinel);
            unsafe {
                (*(kernel_pt_va as *mut PageTable)).entries[pt_index] = kernel_pte;
            }
        }

        let user_pt_va = paging::map_phys_page(user_pt_pa.0);
        for (pt_index, guest_pte) in guest_pt_entries.iter().enumerate() {
            let (_, user_pte) = translate_pte(*guest_pte, pv.mem_base, pv.n_pages, wp, sentinel);
            unsafe {
                (*(user_pt_va as *mut PageTable)).entries[pt_index] = user_pte.unwrap_or(Pte::empty());
            }
        }

        let pde_flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER;
        let kernel_pd_va = paging::map_phys_page(kernel_pd_pa.0);
        unsafe {
            (*(kernel_pd_va as *mut PageDirectory)).entries[pd_index] = Pte::new(kernel_pt_pa.0, pde_flags);
        }
        let user_pd_va = paging::map_phys_page(user_pd_pa.0);
        unsafe {
            (*(user_pd_va as *mut PageDirectory)).entries[pd_index] = Pte::new(user_pt_pa.0, pde_flags);
        }
    }

    install_kernel_pdes(kernel_pd_pa);
    install_kernel_pdes(user_pd_pa);

    Ok(ShadowPd {
        refcount: 1,
        guest_pd,
        wp,
        cr3: kernel_pd_pa,
        user_cr3: user_pd_pa,
    })
}

/// Copy the OS kernel's own low-memory PDEs into a freshly built shadow,
/// so kernel code stays reachable after CR3 is loaded with it (spec.md
/// §8 invariant 7).
fn install_kernel_pdes(shadow_pd_pa: PhysicalAddress) {
    let kernel_pd_va = paging::kernel_page_directory_phys();
    let kernel_pd_mapped = paging::map_phys_page(kernel_pd_va);
    let kernel_entries: [Pte; crate::mm::USER_PD_START] = {
        let mut out = [Pte::empty(); crate::mm::USER_PD_START];
        let src = unsafe { &(*(kernel_pd_mapped as *const PageDirectory)).entries };
        out.copy_from_slice(&src[..crate::mm::USER_PD_START]);
        out
    };

    let shadow_va = paging::map_phys_page(shadow_pd_pa.0);
    unsafe {
        let dst = &mut (*(shadow_va as *mut PageDirectory)).entries;
        dst[..crate::mm::USER_PD_START].copy_from_slice(&kernel_entries);
    }
}

/// `setpd`/`loadpd`: find `guest_pd` in the cache, bump its refcount and
/// make it active, or build a fresh translation and cache it.
pub fn select_or_build(pv: &mut PvBlock, guest_pd: PhysicalAddress, wp: bool) -> (PhysicalAddress, PhysicalAddress) {
    if let Some(pos) = pv.shadow_pds.iter().position(|s| s.guest_pd == guest_pd) {
        let shadow = pv.shadow_pds.remove(pos).unwrap();
        let cr3s = (shadow.cr3, shadow.user_cr3);
        if let Some(previous) = pv.active_shadow.replace(shadow) {
            pv.shadow_pds.push_back(previous);
        }
        return cr3s;
    }

    let shadow = build(pv, guest_pd, wp).expect("out of frames building PV shadow page table");
    let cr3s = (shadow.cr3, shadow.user_cr3);
    if let Some(previous) = pv.active_shadow.replace(Box::new(shadow)) {
        pv.shadow_pds.push_back(previous);
    }
    cr3s
}

/// `adjustpg`: guest reports it modified the PTE covering `guest_vaddr`
/// in its currently active PD; re-translate just that one entry in both
/// shadows.
pub fn adjust_page(pv: &mut PvBlock, guest_vaddr: u32) -> Result<(), crate::error::KernelError> {
    crate::arch::x86::irq::without_interrupts(|| adjust_page_inner(pv, guest_vaddr))
}

fn adjust_page_inner(pv: &mut PvBlock, guest_vaddr: u32) -> Result<(), crate::error::KernelError> {
    use crate::mm::paging::VirtualAddress;

    let shadow = match pv.active_shadow.as_ref() {
        Some(s) => s,
        None => return Ok(()),
    };
    let va = VirtualAddress(guest_vaddr);

    let guest_pd_va = paging::map_phys_page(shadow.guest_pd.0);
    let guest_pde = unsafe { (*(guest_pd_va as *const PageDirectory)).entries[va.pd_index()] };
    if !guest_pde.is_present() {
        return Ok(());
    }
    let guest_pt_va = paging::map_phys_page(guest_pde.frame_base());
    let guest_pte = unsafe { (*(guest_pt_va as *const PageTable)).entries[va.pt_index()] };

    let (kernel_pte, user_pte) = translate_pte(guest_pte, pv.mem_base, pv.n_pages, shadow.wp, pv.sentinel);

    let kernel_pd_va = paging::map_phys_page(shadow.cr3.0);
    let kernel_pde = unsafe { (*(kernel_pd_va as *const PageDirectory)).entries[va.pd_index()] };
    if kernel_pde.is_present() {
        let kernel_pt_va = paging::map_phys_page(kernel_pde.frame_base());
        unsafe {
            (*(kernel_pt_va as *mut PageTable)).entries[va.pt_index()] = kernel_pte;
        }
    }

    let user_pd_va = paging::map_phys_page(shadow.user_cr3.0);
    let user_pde = unsafe { (*(user_pd_va as *const PageDirectory)).entries[va.pd_index()] };
    if user_pde.is_present() {
        let user_pt_va = paging::map_phys_page(user_pde.frame_base());
        unsafe {
            (*(user_pt_va as *mut PageTable)).entries[va.pt_index()] = user_pte.unwrap_or(Pte::empty());
        }
    }

    crate::arch::x86::invlpg(guest_vaddr);
    Ok(())
}

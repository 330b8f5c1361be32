//! Paging (spec.md component B)
//!
//! 32-bit, non-PAE, two-level paging: a page directory of 1024 PDEs, each
//! pointing at a page table of 1024 PTEs. The kernel template maps
//! physical memory below [`super::USER_MEM_START`] 1:1 with the global bit
//! set so it's visible (and not flushed on a CR3 switch) from every
//! process; everything from `USER_PD_START` up is private per-process and
//! copied from each process's own page directory.
//!
//! Free frames are never mapped anywhere permanently — to read or write
//! one (building free-list headers, zero-filling a ZFOD page) the kernel
//! borrows a single per-CPU "scratch" virtual page and rewrites its PTE,
//! mirroring the original's `map_phys_page`/`get_mapped_phys_page_pte`.

extern crate alloc;

use bitflags::bitflags;

pub const PAGE_SIZE: usize = 4096;
const ENTRIES_PER_TABLE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub u32);

impl VirtualAddress {
    pub fn pd_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    pub fn pt_index(self) -> usize {
        ((self.0 >> 12) & 0x3FF) as usize
    }

    pub fn page_offset(self) -> u32 {
        self.0 & 0xFFF
    }

    pub fn page_aligned_down(self) -> Self {
        Self(self.0 & !0xFFF)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        const GLOBAL   = 1 << 8;
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Pte(u32);

impl Pte {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(frame_base: u32, flags: PageFlags) -> Self {
        Self((frame_base & !0xFFF) | flags.bits())
    }

    pub fn frame_base(self) -> u32 {
        self.0 & !0xFFF
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0 & 0xFFF)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    /// A ZFOD PTE: present-bit clear, but the frame field already names
    /// the pre-allocated physical page that will back it once touched.
    pub fn zfod(frame_base: u32, flags: PageFlags) -> Self {
        Self((frame_base & !0xFFF) | (flags - PageFlags::PRESENT).bits())
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Pte; ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn empty() -> Self {
        Self { entries: [Pte::empty(); ENTRIES_PER_TABLE] }
    }
}

#[repr(C, align(4096))]
pub struct PageDirectory {
    pub entries: [Pte; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    pub const fn empty() -> Self {
        Self { entries: [Pte::empty(); ENTRIES_PER_TABLE] }
    }
}

static mut KERNEL_PD: PageDirectory = PageDirectory::empty();
static mut KERNEL_LOW_TABLES: [PageTable; 4] = [
    PageTable::empty(),
    PageTable::empty(),
    PageTable::empty(),
    PageTable::empty(),
];

/// Build the kernel's page directory template: identity-map everything
/// below `USER_MEM_START` with the global bit set. Called once at boot,
/// before the frame allocator (which needs the scratch slot this
/// directory provides) is initialized.
pub fn init_kernel_page_directory() {
    // SAFETY: single-threaded, runs before any other CPU or interrupt
    // handler can observe these statics.
    unsafe {
        let flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::GLOBAL;
        for (pt_idx, table) in KERNEL_LOW_TABLES.iter_mut().enumerate() {
            for (pte_idx, pte) in table.entries.iter_mut().enumerate() {
                let phys = ((pt_idx * ENTRIES_PER_TABLE + pte_idx) * PAGE_SIZE) as u32;
                *pte = Pte::new(phys, flags);
            }
            let table_phys = table as *const PageTable as u32;
            KERNEL_PD.entries[pt_idx] = Pte::new(table_phys, flags);
        }
        // The last PDE of the kernel template is reserved for the
        // per-CPU scratch slot; its PTE is rewritten on every
        // `map_phys_page` call and is never global (it changes meaning
        // constantly and must be flushed each time).
        let scratch_table = SCRATCH_TABLE.get();
        KERNEL_PD.entries[SCRATCH_PD_INDEX] =
            Pte::new(scratch_table as u32, PageFlags::PRESENT | PageFlags::WRITABLE);
    }
}

pub fn kernel_page_directory_phys() -> u32 {
    // SAFETY: `KERNEL_PD` is a `'static` page-aligned structure; taking
    // its physical address (identity-mapped kernel memory) is sound.
    unsafe { core::ptr::addr_of!(KERNEL_PD) as u32 }
}

/// Index reserved in every process's page directory for the scratch slot.
/// Chosen just above the kernel's own low-memory tables and below
/// `USER_PD_START`, so it never collides with real process mappings.
const SCRATCH_PD_INDEX: usize = 4;
const SCRATCH_VADDR: u32 = (SCRATCH_PD_INDEX as u32) << 22;

struct ScratchTable(core::cell::UnsafeCell<PageTable>);
unsafe impl Sync for ScratchTable {}
impl ScratchTable {
    fn get(&self) -> *mut PageTable {
        self.0.get()
    }
}
static SCRATCH_TABLE: ScratchTable = ScratchTable(core::cell::UnsafeCell::new(PageTable::empty()));

/// Temporarily map physical page `pa` into the per-CPU scratch slot and
/// return the virtual address it's now visible at. Used to read/write
/// free-frame metadata (boundary tags) and to zero-fill a ZFOD page,
/// neither of which has any other mapping. Not reentrant: callers must
/// hold interrupts disabled (see [`crate::arch::x86::irq::without_interrupts`])
/// for the whole span during which the returned address is used.
pub fn map_phys_page(pa: u32) -> u32 {
    let flags = PageFlags::PRESENT | PageFlags::WRITABLE;
    // SAFETY: `SCRATCH_TABLE` is reserved exclusively for this purpose and
    // the caller holds interrupts disabled around its use.
    unsafe {
        let table = &mut *SCRATCH_TABLE.get();
        table.entries[0] = Pte::new(pa & !0xFFF, flags);
    }
    crate::arch::x86::invlpg(SCRATCH_VADDR);
    SCRATCH_VADDR
}

/// Allocate a fresh page directory for a new process: copy the kernel's
/// low-memory template (PDEs below `USER_PD_START`, plus the scratch
/// slot) and leave everything above it empty for the caller to fill in.
pub fn new_page_directory() -> Result<PhysicalAddress, crate::error::KernelError> {
    use crate::arch::x86::irq::without_interrupts;
    use crate::mm::frame_allocator;

    without_interrupts(|| {
        let frame = frame_allocator::alloc_user_frames(1)?;
        let pd_phys = frame.addr();
        let vaddr = map_phys_page(pd_phys);
        // SAFETY: `vaddr` is a freshly mapped, exclusively-owned scratch
        // page sized for one `PageDirectory`.
        let pd = unsafe { &mut *(vaddr as *mut PageDirectory) };
        *pd = PageDirectory::empty();
        // SAFETY: `KERNEL_PD` is read-only from here on at runtime.
        let kernel_pd = unsafe { &*core::ptr::addr_of!(KERNEL_PD) };
        pd.entries[..crate::mm::USER_PD_START].copy_from_slice(&kernel_pd.entries[..crate::mm::USER_PD_START]);
        pd.entries[SCRATCH_PD_INDEX] = kernel_pd.entries[SCRATCH_PD_INDEX];
        Ok(PhysicalAddress(pd_phys))
    })
}

/// Tear down a process's address space: every present PDE at or above
/// `USER_PD_START` has its page table frame freed (region frames
/// themselves were already released by
/// [`crate::process::memory::release_region`]), then the page
/// directory's own frame is freed.
pub fn free_page_directory(pd_phys: PhysicalAddress) {
    use crate::arch::x86::irq::without_interrupts;
    use crate::mm::frame_allocator::{self, FrameNumber};

    without_interrupts(|| {
        let pd_vaddr = map_phys_page(pd_phys.0);
        let pd = unsafe { &*(pd_vaddr as *const PageDirectory) };
        let entries: alloc::vec::Vec<Pte> = pd.entries[crate::mm::USER_PD_START..].to_vec();

        for pte in entries {
            if pte.is_present() {
                let frame = FrameNumber(pte.frame_base() / PAGE_SIZE as u32);
                let _ = frame_allocator::free_user_frames(frame, 1);
            }
        }

        let pd_frame = FrameNumber(pd_phys.0 / PAGE_SIZE as u32);
        let _ = frame_allocator::free_user_frames(pd_frame, 1);
    });
}

/// Install `pte` at `va` inside the page directory physically rooted at
/// `pd_phys`, allocating and zeroing a page table frame if the covering
/// PDE is not yet present. Used by region setup (segment loading,
/// `new_pages`, PV guest RAM mapping) to populate a process's address
/// space it does not currently have CR3-loaded.
pub fn install_pte(pd_phys: u32, va: VirtualAddress, pte: Pte) -> Result<(), crate::error::KernelError> {
    use crate::arch::x86::irq::without_interrupts;

    without_interrupts(|| {
        let pd_vaddr = map_phys_page(pd_phys);
        let pd = unsafe { &mut *(pd_vaddr as *mut PageDirectory) };
        let pd_index = va.pd_index();

        let mut pde = pd.entries[pd_index];
        if !pde.is_present() {
            let pt_frame = crate::mm::frame_allocator::alloc_user_frames(1)?;
            let pt_phys = pt_frame.addr();
            let pt_vaddr = map_phys_page(pt_phys);
            unsafe {
                core::ptr::write_bytes(pt_vaddr as *mut u8, 0, PAGE_SIZE);
            }
            pde = Pte::new(pt_phys, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER);

            // Re-map the PD after the scratch slot was reused for the table.
            let pd_vaddr = map_phys_page(pd_phys);
            let pd = unsafe { &mut *(pd_vaddr as *mut PageDirectory) };
            pd.entries[pd_index] = pde;
        }

        let pt_phys = pde.frame_base();
        let pt_vaddr = map_phys_page(pt_phys);
        let pt = unsafe { &mut *(pt_vaddr as *mut PageTable) };
        pt.entries[va.pt_index()] = pte;
        Ok(())
    })
}

/// Clear the PTE mapping `va` in `pd_phys`'s address space, if any PDE
/// covers it at all. Used by `remove_pages`; the caller is responsible
/// for freeing the frame the PTE pointed at. Invalidates the TLB entry
/// if `pd_phys` happens to be the live page directory.
pub fn uninstall_pte(pd_phys: u32, va: VirtualAddress) -> Option<Pte> {
    use crate::arch::x86::irq::without_interrupts;

    without_interrupts(|| {
        let pd_vaddr = map_phys_page(pd_phys);
        let pd = unsafe { &mut *(pd_vaddr as *mut PageDirectory) };
        let pde = pd.entries[va.pd_index()];
        if !pde.is_present() {
            return None;
        }

        let pt_phys = pde.frame_base();
        let pt_vaddr = map_phys_page(pt_phys);
        let pt = unsafe { &mut *(pt_vaddr as *mut PageTable) };
        let old = pt.entries[va.pt_index()];
        pt.entries[va.pt_index()] = Pte::new(0, PageFlags::empty());

        if crate::arch::x86::read_cr3() == pd_phys {
            crate::arch::x86::invlpg(va.0);
        }

        old.is_present().then_some(old)
    })
}

/// Read the PTE mapping `va` in `pd_phys`'s address space without
/// installing or clearing anything, or `None` if no page table is
/// present for this region at all. Unlike [`uninstall_pte`] this returns
/// present *and* ZFOD (present-clear) entries alike, so `fork` can tell
/// the two apart when deciding how to populate the child.
pub fn get_pte(pd_phys: u32, va: VirtualAddress) -> Option<Pte> {
    use crate::arch::x86::irq::without_interrupts;

    without_interrupts(|| {
        let pd_vaddr = map_phys_page(pd_phys);
        let pd = unsafe { &*(pd_vaddr as *const PageDirectory) };
        let pde = pd.entries[va.pd_index()];
        if !pde.is_present() {
            return None;
        }

        let pt_phys = pde.frame_base();
        let pt_vaddr = map_phys_page(pt_phys);
        let pt = unsafe { &*(pt_vaddr as *const PageTable) };
        Some(pt.entries[va.pt_index()])
    })
}

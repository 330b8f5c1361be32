//! Global Descriptor Table
//!
//! Five fixed entries (null, kernel code/data, a TSS, user code/data) plus
//! three PV segments appended at boot once [`crate::pv`] is initialized:
//! a code, data and fs selector whose base sits at
//! [`crate::mm::USER_MEM_START`] and whose limit is the PV guest's address
//! space ceiling (`kern/pv.c: pv_init`). Guests run ring 3 through these
//! selectors so their flat addresses land inside the shadow-mapped region.

use lazy_static::lazy_static;
use spin::Mutex;
use x86::bits32::task::TaskStateSegment;
use x86::dtables::DescriptorTablePointer;
use x86::segmentation::{BuildDescriptor, CodeSegmentType, DataSegmentType, Descriptor, SegmentDescriptorBuilder, SegmentSelector};
use x86::Ring;

pub const SEGSEL_KERNEL_CS: u16 = 0x08;
pub const SEGSEL_KERNEL_DS: u16 = 0x10;
pub const SEGSEL_TSS: u16 = 0x18;
pub const SEGSEL_USER_DS: u16 = 0x20 | (Ring::Ring3 as u16);
pub const SEGSEL_USER_CS: u16 = 0x28 | (Ring::Ring3 as u16);

/// Index of the first PV segment, appended at runtime by [`crate::pv::init`].
pub const SEGSEL_PV_CS_IDX: usize = 7;
pub const SEGSEL_PV_DS_IDX: usize = 8;
pub const SEGSEL_PV_FS_IDX: usize = 9;

const GDT_ENTRIES: usize = 16;

struct Gdt {
    table: [u64; GDT_ENTRIES],
    len: usize,
}

lazy_static! {
    static ref GDT: Mutex<Gdt> = Mutex::new(Gdt::new());
    static ref TSS: Mutex<TaskStateSegment> = Mutex::new(TaskStateSegment::new());
}

impl Gdt {
    fn new() -> Self {
        let mut table = [0u64; GDT_ENTRIES];
        table[1] = Descriptor::new_memory(
            CodeSegmentType::ExecuteRead.into(),
            false,
            Ring::Ring0,
            0,
            0xFFFF_FFFF,
            true,
        )
        .bits();
        table[2] = Descriptor::new_memory(
            DataSegmentType::ReadWrite.into(),
            false,
            Ring::Ring0,
            0,
            0xFFFF_FFFF,
            true,
        )
        .bits();
        table[4] = Descriptor::new_memory(
            DataSegmentType::ReadWrite.into(),
            false,
            Ring::Ring3,
            0,
            0xFFFF_FFFF,
            true,
        )
        .bits();
        table[5] = Descriptor::new_memory(
            CodeSegmentType::ExecuteRead.into(),
            false,
            Ring::Ring3,
            0,
            0xFFFF_FFFF,
            true,
        )
        .bits();
        Self { table, len: 6 }
    }

    /// Append a code+data+fs triple for PV guest segmentation, based at
    /// `base` with the given `limit` in pages (`kern/pv.c: pv_init`).
    fn append_pv_segments(&mut self, base: u32, limit_pages: u32) {
        self.table[SEGSEL_PV_CS_IDX] = Descriptor::new_memory(
            CodeSegmentType::ExecuteRead.into(),
            false,
            Ring::Ring3,
            base,
            limit_pages,
            true,
        )
        .bits();
        self.table[SEGSEL_PV_DS_IDX] = Descriptor::new_memory(
            DataSegmentType::ReadWrite.into(),
            false,
            Ring::Ring3,
            base,
            limit_pages,
            true,
        )
        .bits();
        self.table[SEGSEL_PV_FS_IDX] = self.table[SEGSEL_PV_DS_IDX];
        self.len = self.len.max(SEGSEL_PV_FS_IDX + 1);
    }
}

/// Install the GDT and TSS and reload CS/DS/SS/TSS. Called once per CPU at
/// boot, before interrupts are enabled.
pub fn init() {
    let gdt = GDT.lock();
    let ptr = DescriptorTablePointer::new(&gdt.table[..gdt.len]);
    // SAFETY: `ptr` describes a `'static` table kept alive for the life of
    // the kernel; loading it replaces the bootloader-provided GDT before
    // any other code depends on the old one.
    unsafe {
        x86::dtables::lgdt(&ptr);
        x86::segmentation::load_cs(SegmentSelector::new(1, Ring::Ring0));
        x86::segmentation::load_ds(SegmentSelector::new(2, Ring::Ring0));
        x86::segmentation::load_es(SegmentSelector::new(2, Ring::Ring0));
        x86::segmentation::load_ss(SegmentSelector::new(2, Ring::Ring0));
        x86::task::load_tr(SegmentSelector::new(3, Ring::Ring0));
    }
}

/// Set the ring-0 stack pointer the CPU loads on a ring3->ring0 trap.
pub fn set_kernel_stack(esp0: u32) {
    TSS.lock().esp0 = esp0;
}

pub fn install_pv_segments(base: u32, limit_pages: u32) {
    GDT.lock().append_pv_segments(base, limit_pages);
}

/// The selector a PV guest's code segment register reads as while it is
/// executing, used by the fault dispatcher to recognize "this fault
/// happened inside a PV guest" (spec.md §4.G step 2).
pub fn pv_cs_selector() -> u16 {
    SegmentSelector::new(SEGSEL_PV_CS_IDX as u16, Ring::Ring3).bits()
}

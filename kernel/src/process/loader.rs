//! ELF program loading into a fresh (or `exec`-replaced) address space
//!
//! Each `PT_LOAD` segment becomes one present, eagerly-populated
//! [`MemoryRegion`]: its frames are allocated, the file's bytes are
//! copied in through the scratch slot, and anything past `file_size`
//! (bss) is left zeroed. Segments load eagerly rather than through ZFOD
//! since their content must exist before the entry point ever runs.

extern crate alloc;

use alloc::vec::Vec;

use crate::arch::x86::irq::without_interrupts;
use crate::error::{KernelError, SyscallFailure};
use crate::mm::frame_allocator::{self, FrameNumber};
use crate::mm::paging::{self, PageFlags, PhysicalAddress, Pte, VirtualAddress, PAGE_SIZE};
use crate::process::memory::MemoryRegion;

pub struct LoadedProgram {
    pub entry_point: u32,
    pub regions: Vec<MemoryRegion>,
}

/// Load `image` (a raw ELF file) into the address space rooted at
/// `pd_phys`, returning its entry point and the regions it occupies.
pub fn load_program(pd_phys: PhysicalAddress, image: &[u8]) -> Result<LoadedProgram, KernelError> {
    let parsed = crate::elf::parse(image)?;
    let mut regions = Vec::with_capacity(parsed.segments.len());

    for seg in &parsed.segments {
        let virt_start = seg.vaddr & !(PAGE_SIZE as u32 - 1);
        let span = (seg.vaddr - virt_start) + seg.mem_size;
        let num_pages = span.div_ceil(PAGE_SIZE as u32).max(1);

        let first_frame = frame_allocator::alloc_user_frames(num_pages)?;
        let region = MemoryRegion {
            virt_start,
            size_bytes: num_pages * PAGE_SIZE as u32,
            phys_start: first_frame.addr(),
            writable: seg.writable,
        };

        populate_segment(&region, seg, image)?;
        map_region(pd_phys.0, &region)?;
        regions.push(region);
    }

    Ok(LoadedProgram { entry_point: parsed.entry_point, regions })
}

fn populate_segment(region: &MemoryRegion, seg: &crate::elf::LoadedSegment, image: &[u8]) -> Result<(), KernelError> {
    without_interrupts(|| {
        for page in 0..region.num_pages() {
            let frame_phys = region.phys_start + page * PAGE_SIZE as u32;
            let vaddr = paging::map_phys_page(frame_phys);
            // SAFETY: `map_phys_page` just installed a writable mapping
            // for exactly one scratch page at `vaddr`.
            unsafe { core::ptr::write_bytes(vaddr as *mut u8, 0, PAGE_SIZE) };
        }

        let file_bytes = image
            .get(seg.file_offset as usize..(seg.file_offset + seg.file_size) as usize)
            .ok_or(SyscallFailure::InvalidArgument)?;

        let mut dst_off = seg.vaddr - region.virt_start;
        let mut remaining = file_bytes;
        while !remaining.is_empty() {
            let page_idx = dst_off / PAGE_SIZE as u32;
            let page_off = dst_off % PAGE_SIZE as u32;
            let frame_phys = region.phys_start + page_idx * PAGE_SIZE as u32;
            let vaddr = paging::map_phys_page(frame_phys);
            let n = remaining.len().min((PAGE_SIZE as u32 - page_off) as usize);
            // SAFETY: `vaddr + page_off` lies within the scratch page
            // just mapped above, `n` bytes of room remain within it.
            unsafe {
                core::ptr::copy_nonoverlapping(remaining.as_ptr(), (vaddr + page_off) as *mut u8, n);
            }
            remaining = &remaining[n..];
            dst_off += n as u32;
        }
        Ok(())
    })
}

fn map_region(pd_phys: u32, region: &MemoryRegion) -> Result<(), KernelError> {
    let mut flags = PageFlags::PRESENT | PageFlags::USER;
    if region.writable {
        flags |= PageFlags::WRITABLE;
    }
    for page in 0..region.num_pages() {
        let va = VirtualAddress(region.virt_start + page * PAGE_SIZE as u32);
        let frame = FrameNumber(region.phys_start / PAGE_SIZE as u32 + page);
        paging::install_pte(pd_phys, va, Pte::new(frame.addr(), flags))?;
    }
    Ok(())
}

//! Per-process memory regions (spec.md §3 "Memory region")
//!
//! `(virt_start, size_bytes, phys_start, writable)`, with the invariants
//! spec.md names: regions don't overlap, `virt_start` lies in
//! `[USER_MEM_START, STACK_TOP)`, and destroying the process releases
//! every region's frames. Regions model loaded ELF segments, the stack,
//! heap pages from `new_pages`, and (for PV) the guest's RAM image.

use alloc::vec::Vec;

use crate::error::{KernelError, SyscallFailure};
use crate::mm::frame_allocator::{self, FrameNumber};
use crate::mm::paging::{PageFlags, Pte, VirtualAddress, PAGE_SIZE};
use crate::mm::{STACK_TOP, USER_MEM_START};

#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub virt_start: u32,
    pub size_bytes: u32,
    pub phys_start: u32,
    pub writable: bool,
}

impl MemoryRegion {
    pub fn end(&self) -> u32 {
        self.virt_start + self.size_bytes
    }

    pub fn num_pages(&self) -> u32 {
        self.size_bytes / PAGE_SIZE as u32
    }
}

pub fn validate_bounds(virt_start: u32, size_bytes: u32) -> Result<(), KernelError> {
    if size_bytes == 0 || size_bytes % PAGE_SIZE as u32 != 0 || virt_start % PAGE_SIZE as u32 != 0 {
        return Err(SyscallFailure::InvalidArgument.into());
    }
    if virt_start < USER_MEM_START || virt_start.checked_add(size_bytes).ok_or(SyscallFailure::InvalidArgument)? > STACK_TOP {
        return Err(SyscallFailure::InvalidArgument.into());
    }
    Ok(())
}

pub fn regions_overlap(regions: &[MemoryRegion], virt_start: u32, size_bytes: u32) -> bool {
    let new_end = virt_start + size_bytes;
    regions.iter().any(|r| virt_start < r.end() && r.virt_start < new_end)
}

/// Allocate `num_pages` fresh user frames and add a new ZFOD-mapped
/// region to `regions` at `virt_start` (the `new_pages` syscall's handler
/// is the only caller; segment loading maps its pages eagerly instead).
pub fn add_zfod_region(
    regions: &mut Vec<MemoryRegion>,
    pd_phys: u32,
    virt_start: u32,
    num_pages: u32,
    writable: bool,
) -> Result<(), KernelError> {
    let size_bytes = num_pages * PAGE_SIZE as u32;
    validate_bounds(virt_start, size_bytes)?;
    if regions_overlap(regions, virt_start, size_bytes) {
        return Err(SyscallFailure::InvalidArgument.into());
    }

    let first_frame = frame_allocator::alloc_user_frames(num_pages)?;
    let mut flags = PageFlags::USER;
    if writable {
        flags |= PageFlags::WRITABLE;
    }
    for i in 0..num_pages {
        let va = VirtualAddress(virt_start + i * PAGE_SIZE as u32);
        let frame = FrameNumber(first_frame.0 + i);
        let pte = Pte::zfod(frame.addr(), flags | PageFlags::PRESENT);
        crate::mm::paging::install_pte(pd_phys, va, pte)?;
    }

    regions.push(MemoryRegion {
        virt_start,
        size_bytes,
        phys_start: first_frame.addr(),
        writable,
    });
    Ok(())
}

/// Release a region's frames back to the pool. Called on `remove_pages`
/// and during process teardown.
pub fn release_region(region: &MemoryRegion) -> Result<(), KernelError> {
    let first_frame = FrameNumber(region.phys_start / PAGE_SIZE as u32);
    frame_allocator::free_user_frames(first_frame, region.num_pages())?;
    Ok(())
}

/// `REMOVE_PAGES` syscall: find the region starting exactly at
/// `virt_start`, unmap its PTEs, free its frames, and drop it from
/// `regions`. Fails if no region starts there (the original rejects
/// any address that isn't the base a matching `new_pages` returned).
pub fn remove_region(regions: &mut Vec<MemoryRegion>, pd_phys: u32, virt_start: u32) -> Result<(), KernelError> {
    let index = regions
        .iter()
        .position(|r| r.virt_start == virt_start)
        .ok_or(SyscallFailure::InvalidArgument)?;
    let region = regions.remove(index);

    for page in 0..region.num_pages() {
        let va = VirtualAddress(region.virt_start + page * PAGE_SIZE as u32);
        crate::mm::paging::uninstall_pte(pd_phys, va);
    }
    release_region(&region)
}

extern crate alloc;

//! ELF program image consumption
//!
//! The ELF parser itself is an imported library (`xmas-elf`, no dynamic
//! relocation support needed since spec.md §1 excludes it); this module
//! is the thin adapter that walks `PT_LOAD` segments and asks the memory
//! subsystem to back each one with ZFOD pages, matching the original's
//! `read_file`-into-freshly-mapped-region approach in `kern/loader.c`.

use alloc::vec::Vec;
use xmas_elf::program::{ProgramHeader, Type as SegmentType};
use xmas_elf::ElfFile;

use crate::error::{KernelError, SyscallFailure};
use crate::mm::paging::PageFlags;

pub struct LoadedImage {
    pub entry_point: u32,
    pub segments: Vec<LoadedSegment>,
}

pub struct LoadedSegment {
    pub vaddr: u32,
    pub mem_size: u32,
    pub file_offset: u32,
    pub file_size: u32,
    pub writable: bool,
    pub executable: bool,
}

/// Parse `image` and return the segment plan for the caller to map into a
/// fresh (or current, for `exec`) address space. Does not touch paging
/// itself — that stays in `process::memory` where the address space lives.
pub fn parse(image: &[u8]) -> Result<LoadedImage, KernelError> {
    let elf = ElfFile::new(image).map_err(|_| SyscallFailure::InvalidArgument)?;

    let mut segments = Vec::new();
    for ph in elf.program_iter() {
        if ph.get_type() != Ok(SegmentType::Load) {
            continue;
        }
        segments.push(segment_from(&ph));
    }
    if segments.is_empty() {
        return Err(SyscallFailure::InvalidArgument.into());
    }

    Ok(LoadedImage { entry_point: elf.header.pt2.entry_point() as u32, segments })
}

fn segment_from(ph: &ProgramHeader) -> LoadedSegment {
    let flags = ph.flags();
    LoadedSegment {
        vaddr: ph.virtual_addr() as u32,
        mem_size: ph.mem_size() as u32,
        file_offset: ph.offset() as u32,
        file_size: ph.file_size() as u32,
        writable: flags.is_write(),
        executable: flags.is_execute(),
    }
}

impl LoadedSegment {
    pub fn page_flags(&self) -> PageFlags {
        let mut flags = PageFlags::PRESENT | PageFlags::USER;
        if self.writable {
            flags |= PageFlags::WRITABLE;
        }
        flags
    }
}

extern crate alloc;

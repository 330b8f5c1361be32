//! Minimal multiboot2 info-structure reader
//!
//! Walks the tag list the boot loader leaves behind looking only for the
//! two things this kernel needs to get running: a basic-memory-info (or
//! memory-map) tag to size the frame allocator, and a module tag naming
//! the compiled-in executable archive image. Uses `multiboot2 = "0.21"`.

use multiboot2::{BootInformation, BootInformationHeader};

pub struct BootInfo {
    pub total_phys_bytes: u32,
    pub archive_base: u32,
    pub archive_len: u32,
}

pub fn parse(mbinfo_addr: u32) -> BootInfo {
    // SAFETY: `mbinfo_addr` is the physical address handed to us by the
    // multiboot2-compliant boot loader in `ebx`, identity-mapped at this
    // point in boot (paging not yet switched to the kernel's own tables).
    let boot_info = unsafe {
        BootInformation::load(mbinfo_addr as *const BootInformationHeader)
            .expect("malformed multiboot2 info structure")
    };

    let total_phys_bytes = boot_info
        .memory_map_tag()
        .and_then(|mmap| mmap.memory_areas().iter().map(|a| a.end_address()).max())
        .or_else(|| boot_info.basic_memory_info_tag().map(|b| (b.upper_memory() as u64) * 1024 + 1024 * 1024))
        .unwrap_or(64 * 1024 * 1024) as u32;

    let module = boot_info
        .module_tags()
        .next()
        .expect("no archive module passed by boot loader");

    BootInfo {
        total_phys_bytes,
        archive_base: module.start_address(),
        archive_len: module.end_address() - module.start_address(),
    }
}

//! Compiled-in read-only executable archive
//!
//! The only "filesystem" this kernel has (spec.md §1 Non-goal: no real
//! filesystem). A flat table of `(name, start, length)` entries packed
//! into the image by the boot loader as a module; `exec` looks an entry
//! up by name, and a special `"."` name lists all entries for the
//! in-box shell-equivalent userspace program.

use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub start: u32,
    pub len: u32,
}

struct Archive {
    entries: Vec<ArchiveEntry>,
}

static ARCHIVE: spin::Mutex<Option<Archive>> = spin::Mutex::new(None);

/// Parse the archive's directory header, which the original lays out as
/// a count followed by `count` fixed records of `(name[32], offset, len)`.
pub fn init(base: u32, len: u32) {
    let mut entries = Vec::new();
    // SAFETY: `base`/`len` describe the multiboot module range, which the
    // boot loader guarantees is mapped and untouched at this point in boot.
    unsafe {
        let header = base as *const u32;
        let count = core::ptr::read(header) as usize;
        let mut cursor = base + 4;
        for _ in 0..count {
            const NAME_LEN: usize = 32;
            let name_ptr = cursor as *const u8;
            let name_bytes = core::slice::from_raw_parts(name_ptr, NAME_LEN);
            let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
            let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
            let offset = core::ptr::read((cursor + NAME_LEN as u32) as *const u32);
            let entry_len = core::ptr::read((cursor + NAME_LEN as u32 + 4) as *const u32);
            entries.push(ArchiveEntry { name, start: base + offset, len: entry_len });
            cursor += NAME_LEN as u32 + 8;
        }
    }
    log::info!(target: "fs", "archive loaded: {} entries ({} bytes)", entries.len(), len);
    *ARCHIVE.lock() = Some(Archive { entries });
}

pub fn lookup(name: &str) -> Option<ArchiveEntry> {
    ARCHIVE.lock().as_ref()?.entries.iter().find(|e| e.name == name).cloned()
}

/// Directory listing, used by the `"."` special name.
pub fn list() -> Vec<String> {
    ARCHIVE
        .lock()
        .as_ref()
        .map(|a| a.entries.iter().map(|e| e.name.clone()).collect())
        .unwrap_or_default()
}

/// Borrow an entry's bytes straight out of the module image. The
/// archive is kernel memory fixed at boot, never unmapped or moved, so
/// this is a plain slice and not a `user_copy` operation — only the
/// caller's eventual write into a user buffer is.
pub fn bytes(entry: &ArchiveEntry) -> &'static [u8] {
    // SAFETY: `start`/`len` come from `init`'s parse of the multiboot
    // module range, which stays mapped and immutable for the kernel's
    // lifetime.
    unsafe { core::slice::from_raw_parts(entry.start as *const u8, entry.len as usize) }
}

extern crate alloc;

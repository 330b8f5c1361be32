//! Kernel heap allocator
//!
//! The kernel's own `alloc::{Vec, BTreeMap, Box}` needs (region lists, the
//! tid table, shadow-PD lists) are backed by `linked_list_allocator`.
//! There is exactly one heap, statically
//! reserved inside the kernel image; the user/guest frame pool of
//! component A is a completely separate allocator.

use linked_list_allocator::LockedHeap;

const HEAP_SIZE: usize = 4 * 1024 * 1024;

static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

pub fn init() {
    // SAFETY: `HEAP_MEMORY` is a `'static` array, not yet referenced by
    // any other allocation, and this runs exactly once at boot before the
    // first `alloc::vec!`/`Box::new` call.
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
    log::info!(target: "mm", "kernel heap initialized ({} KiB)", HEAP_SIZE / 1024);
}

#[cfg(test)]
mod tests {
    extern crate std;

    #[test]
    fn heap_size_is_page_aligned() {
        assert_eq!(super::HEAP_SIZE % super::super::PAGE_SIZE, 0);
    }
}

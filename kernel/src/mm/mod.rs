//! Virtual-memory and physical-frame management
//!
//! Owns the whole of spec components A (frame allocator), B (paging) and
//! C (user-memory copy). Everything above `USER_MEM_START` in physical
//! space belongs to the user-frame pool; everything below is the
//! kernel's own identity-mapped low memory.

pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod paging;
pub mod user_copy;

pub use frame_allocator::{FrameAllocatorError, FrameNumber, FRAME_ALLOCATOR};
pub use paging::{PageFlags, PhysicalAddress, VirtualAddress, PAGE_SIZE};

/// First byte of the user-frame pool, and the first valid user virtual
/// address. Below this, physical memory is kernel-owned and identity
/// mapped with the global bit set.
pub const USER_MEM_START: u32 = 16 * 1024 * 1024; // 16 MiB

/// First page-directory index considered "user" (PDEs at or above this
/// index are private per-process; below it they are copied verbatim from
/// the kernel template).
pub const USER_PD_START: usize = (USER_MEM_START as usize) >> 22;

/// Top of the user address space (exclusive). The initial stack for a new
/// thread is placed just below this.
pub const STACK_TOP: u32 = 0xFFFF_E000;

/// Initialize the memory subsystem: probe RAM size, build the frame
/// allocator's bitmap+bins, and build the kernel page directory template.
pub fn init(total_phys_bytes: u32) {
    paging::init_kernel_page_directory();
    frame_allocator::init(total_phys_bytes);
    log::info!(target: "mm", "memory management initialized ({} MiB user pool)",
        (total_phys_bytes - USER_MEM_START) / (1024 * 1024));
}

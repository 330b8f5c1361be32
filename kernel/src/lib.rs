//! Kernel library
//!
//! Exports the kernel's modules for the `#[cfg(test)]` host-side unit test
//! lane (spec.md's pure data-structure tests run here, against the system
//! allocator) and for `kernel/tests/*.rs` integration tests. The on-target
//! boot entry point itself lives in `main.rs`.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(custom_test_frameworks)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_framework::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;
#[macro_use]
pub mod serial;

mod intrinsics;

pub mod arch;
pub mod elf;
pub mod error;
pub mod exception;
pub mod fs;
pub mod log_service;
pub mod mm;
pub mod process;
pub mod pts;
pub mod pv;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(target_os = "none")]
mod test_framework;

pub use error::KernelError;
pub use mm::{FrameNumber, FRAME_ALLOCATOR};
pub use sched::ThreadId;

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {
        crate::arch::x86::hlt();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Heap allocation failure in a `no_std` kernel is unrecoverable; the
/// `alloc_error_handler` ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

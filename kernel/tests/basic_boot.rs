//! Boot smoke test: bring up every non-multiboot-dependent subsystem in
//! the same order `kernel_main` does and confirm nothing panics.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::error::KernelError;
use veridian_kernel::{kernel_assert, kernel_assert_eq, serial_println};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("starting boot smoke test");

    veridian_kernel::log_service::init();
    veridian_kernel::arch::x86::gdt::init();
    veridian_kernel::arch::x86::idt::init();
    veridian_kernel::arch::x86::timer::init();
    veridian_kernel::mm::init(64 * 1024 * 1024);
    veridian_kernel::mm::heap::init();
    veridian_kernel::process::table::init();
    veridian_kernel::sched::init();
    veridian_kernel::pts::init();

    test_main();
    loop {
        veridian_kernel::arch::x86::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_framework::test_panic_handler(info)
}

#[test_case]
fn arithmetic_sanity() -> Result<(), KernelError> {
    kernel_assert_eq!(2 + 2, 4);
    Ok(())
}

#[test_case]
fn frame_allocator_reports_the_whole_user_pool_free() -> Result<(), KernelError> {
    let free = veridian_kernel::mm::frame_allocator::FRAME_ALLOCATOR.lock().free_frame_count();
    let total = veridian_kernel::mm::frame_allocator::FRAME_ALLOCATOR.lock().total_frame_count();
    kernel_assert_eq!(free, total);
    Ok(())
}

#[test_case]
fn console_multiplexer_has_a_foreground_pts() -> Result<(), KernelError> {
    let id = veridian_kernel::pts::active_id();
    kernel_assert_eq!(id, 0);
    Ok(())
}

#[test_case]
fn process_and_thread_tables_start_empty() -> Result<(), KernelError> {
    kernel_assert!(veridian_kernel::process::table::process_count() == 0);
    kernel_assert!(veridian_kernel::process::table::thread_count() == 0);
    Ok(())
}

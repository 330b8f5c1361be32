//! Kernel entry point
//!
//! Receives control from the (external, imported) boot loader already in
//! 32-bit protected mode with paging off, parses the multiboot info
//! structure, and brings each subsystem up in dependency order: logging
//! and the serial port first (so every later failure can be reported),
//! then memory management (frame allocator + kernel page directory),
//! GDT/IDT, the scheduler, the root process, and finally the PTS
//! multiplexer before dropping into the scheduler's run loop, which never
//! returns.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![cfg_attr(test, test_runner(crate::test_runner))]
#![cfg_attr(test, reexport_test_harness_main = "test_main")]

extern crate alloc;

use core::panic::PanicInfo;

#[macro_use]
mod print;
#[macro_use]
mod serial;

mod arch;
mod boot;
mod elf;
mod error;
mod exception;
mod fs;
mod intrinsics;
mod log_service;
mod mm;
mod process;
mod pts;
mod pv;
mod sched;
mod sync;
mod syscall;

/// Magic multiboot2 value the boot loader leaves in `eax`.
const MULTIBOOT2_MAGIC: u32 = 0x36d7_6289;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[PANIC] {}", info);
    for entry in log_service::recent(16) {
        serial_println!("  [{:>5?}][{}] {}", entry.level, entry.subsystem(), entry.message());
    }
    arch::x86::hlt();
    loop {
        arch::x86::hlt();
    }
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[PANIC] {}", info);
    loop {
        arch::x86::hlt();
    }
}

#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

/// Entered by the multiboot2 trampoline with `eax` = [`MULTIBOOT2_MAGIC`]
/// and `ebx` = physical address of the multiboot info structure.
#[no_mangle]
pub extern "C" fn kernel_main(magic: u32, mbinfo_addr: u32) -> ! {
    log_service::init();
    log::info!(target: "boot", "kernel build {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    if magic != MULTIBOOT2_MAGIC {
        panic!("not booted via multiboot2 (eax=0x{:x})", magic);
    }
    let boot_info = fs::multiboot::parse(mbinfo_addr);

    arch::x86::gdt::init();
    arch::x86::idt::init();
    arch::x86::timer::init();

    mm::init(boot_info.total_phys_bytes);
    mm::heap::init();

    fs::archive::init(boot_info.archive_base, boot_info.archive_len);

    process::init();
    sched::init();
    pts::init();
    pv::init();

    #[cfg(test)]
    test_main();

    arch::x86::irq::mark_ready();
    // SAFETY: interrupts are unmasked only once the scheduler, the ready
    // thread table, and the timer/keyboard vectors are all installed.
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) };

    sched::run()
}

#[cfg(test)]
fn test_runner(tests: &[&dyn Fn()]) {
    serial_println!("running {} tests", tests.len());
    for test in tests {
        test();
    }
    loop {
        arch::x86::hlt();
    }
}

//! On-target tests for the paravirtualization core (component J):
//! shadow page-directory caching and the virtual interrupt-flag gate.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(veridian_kernel::test_framework::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use veridian_kernel::error::KernelError;
use veridian_kernel::mm::paging;
use veridian_kernel::pv::PvBlock;
use veridian_kernel::{kernel_assert, kernel_assert_eq, kernel_assert_ne};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    veridian_kernel::mm::init(64 * 1024 * 1024);
    veridian_kernel::mm::heap::init();
    test_main();
    loop {
        veridian_kernel::arch::x86::hlt();
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    veridian_kernel::test_framework::test_panic_handler(info)
}

/// A fresh `PvBlock` starts with interrupts virtually masked (the guest
/// must `enable` before anything can be injected).
#[test_case]
fn fresh_pv_block_starts_with_interrupts_masked() -> Result<(), KernelError> {
    let mem_base = paging::new_page_directory()?;
    let pv = PvBlock::new(mem_base, 16);
    kernel_assert!(!pv.vif);
    Ok(())
}

#[test_case]
fn enable_and_disable_toggle_the_virtual_interrupt_flag() -> Result<(), KernelError> {
    let mem_base = paging::new_page_directory()?;
    let mut pv = PvBlock::new(mem_base, 16);
    pv.unmask_interrupt();
    kernel_assert!(pv.vif);
    pv.mask_interrupt();
    kernel_assert!(!pv.vif);
    Ok(())
}

/// Shadow PD reuse: switching `loadpd` to a second guest page directory
/// and back to the first reuses the cached shadow pair (same CR3s)
/// rather than rebuilding, and the previously active shadow is the one
/// found in the cache.
#[test_case]
fn switching_back_to_a_guest_pd_reuses_its_cached_shadow() -> Result<(), KernelError> {
    let mem_base = paging::new_page_directory()?;
    let mut pv = PvBlock::new(mem_base, 16);

    let guest_pd_a = paging::new_page_directory()?;
    let guest_pd_b = paging::new_page_directory()?;

    let (a_cr3, a_user_cr3) = pv.select_pd(guest_pd_a, false);
    kernel_assert!(pv.active_shadow.is_some());
    kernel_assert!(pv.shadow_pds.is_empty());

    let (b_cr3, _b_user_cr3) = pv.select_pd(guest_pd_b, false);
    kernel_assert_ne!(b_cr3, a_cr3);
    // Switching away from guest A must have cached it rather than
    // dropping it, or switching back below would rebuild from scratch.
    kernel_assert_eq!(pv.shadow_pds.len(), 1);

    let (a_cr3_again, a_user_cr3_again) = pv.select_pd(guest_pd_a, false);
    kernel_assert_eq!(a_cr3_again, a_cr3);
    kernel_assert_eq!(a_user_cr3_again, a_user_cr3);
    kernel_assert_eq!(pv.shadow_pds.len(), 1);

    Ok(())
}

#[test_case]
fn setidt_rejects_an_out_of_range_vector() -> Result<(), KernelError> {
    let mem_base = paging::new_page_directory()?;
    let mut pv = PvBlock::new(mem_base, 16);
    kernel_assert!(pv.vidt.set(14, 0x4000, 0));
    kernel_assert!(!pv.vidt.set(9999, 0x4000, 0));
    Ok(())
}
